//! Mean-reversion strategy parameters.
//!
//! One struct drives both the backtest and the live path; the two differ
//! only in which bar source and execution port they are given.

use super::error::RevtraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    /// Adverse move, as a fraction of entry price, that forces an exit.
    pub stop_loss_fraction: f64,
    /// Shares traded per entry.
    pub lot_size: u32,
    pub bollinger_multiplier: f64,
    /// Window for the SMA and the Bollinger Bands.
    pub sma_period: usize,
    /// Durbin-Watson lag window, in percent-change observations.
    pub dw_window: usize,
    /// Bars observed before any transition is allowed.
    pub warmup_bars: usize,
    /// Entries require `dw_lower <= dw < dw_upper`.
    pub dw_lower: f64,
    pub dw_upper: f64,
    /// Send entries as OTO orders carrying a protective stop.
    pub attach_stop_order: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            stop_loss_fraction: 0.01,
            lot_size: 500,
            bollinger_multiplier: 2.0,
            sma_period: 20,
            dw_window: 10,
            warmup_bars: 30,
            dw_lower: 1.5,
            dw_upper: 2.0,
            attach_stop_order: false,
        }
    }
}

impl StrategyConfig {
    pub fn dw_in_entry_band(&self, dw: f64) -> bool {
        self.dw_lower <= dw && dw < self.dw_upper
    }

    pub fn validate(&self) -> Result<(), RevtraderError> {
        if !(self.stop_loss_fraction > 0.0 && self.stop_loss_fraction < 1.0) {
            return Err(invalid(
                "stop_loss_fraction",
                "stop_loss_fraction must be between 0 and 1",
            ));
        }
        if self.lot_size == 0 {
            return Err(invalid("lot_size", "lot_size must be at least 1"));
        }
        if !(self.bollinger_multiplier > 0.0) {
            return Err(invalid(
                "bollinger_multiplier",
                "bollinger_multiplier must be positive",
            ));
        }
        if self.sma_period < 2 {
            return Err(invalid("sma_period", "sma_period must be at least 2"));
        }
        if self.dw_window < 2 {
            return Err(invalid("dw_window", "dw_window must be at least 2"));
        }
        if self.dw_lower >= self.dw_upper {
            return Err(invalid("dw_lower", "dw_lower must be below dw_upper"));
        }
        let needed = self.sma_period.max(self.dw_window + 1);
        if self.warmup_bars < needed {
            return Err(invalid(
                "warmup_bars",
                &format!("warmup_bars must be at least {needed} to cover the indicator windows"),
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> RevtraderError {
    RevtraderError::ConfigInvalid {
        section: "strategy".to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = StrategyConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.sma_period, 20);
        assert_eq!(c.dw_window, 10);
        assert_eq!(c.warmup_bars, 30);
    }

    #[test]
    fn dw_band_is_half_open() {
        let c = StrategyConfig::default();
        assert!(c.dw_in_entry_band(1.5));
        assert!(c.dw_in_entry_band(1.99));
        assert!(!c.dw_in_entry_band(2.0));
        assert!(!c.dw_in_entry_band(1.49));
        assert!(!c.dw_in_entry_band(4.0));
    }

    #[test]
    fn zero_lot_size_rejected() {
        let c = StrategyConfig {
            lot_size: 0,
            ..Default::default()
        };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("lot_size"));
    }

    #[test]
    fn stop_loss_fraction_bounds() {
        for bad in [0.0, -0.01, 1.0, f64::NAN] {
            let c = StrategyConfig {
                stop_loss_fraction: bad,
                ..Default::default()
            };
            assert!(c.validate().is_err(), "{bad} should be rejected");
        }
        let c = StrategyConfig {
            stop_loss_fraction: 0.005,
            ..Default::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn warmup_must_cover_windows() {
        let c = StrategyConfig {
            warmup_bars: 15,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = StrategyConfig {
            warmup_bars: 20,
            ..Default::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn inverted_dw_band_rejected() {
        let c = StrategyConfig {
            dw_lower: 2.0,
            dw_upper: 1.5,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }
}
