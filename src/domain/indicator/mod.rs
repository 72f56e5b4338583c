//! Rolling indicator engine.
//!
//! Every statistic is a pure function of a window taken from the tail of
//! the close or percent-change series:
//! - `sma`: simple moving average of closes
//! - `bollinger`: SMA-centred envelope at +/- k population stddevs
//! - `durbin_watson`: lag-1 serial correlation of percent changes
//!
//! `IndicatorEngine::evaluate` bundles them into one `IndicatorSnapshot`
//! whose `ready` flag is the single readiness check consumers rely on.

pub mod bollinger;
pub mod durbin_watson;
pub mod sma;
pub mod stddev;

use std::fmt;

use super::strategy::StrategyConfig;

/// Indicator values for one tick. Values are 0.0 while `ready` is false.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub sma: f64,
    pub bollinger_lower: f64,
    pub bollinger_upper: f64,
    pub durbin_watson: f64,
    pub ready: bool,
}

impl IndicatorSnapshot {
    pub fn not_ready() -> Self {
        IndicatorSnapshot {
            sma: 0.0,
            bollinger_lower: 0.0,
            bollinger_upper: 0.0,
            durbin_watson: 0.0,
            ready: false,
        }
    }
}

impl fmt::Display for IndicatorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ready {
            return write!(f, "not ready");
        }
        write!(
            f,
            "sma={:.4} bb=[{:.4}, {:.4}] dw={:.4}",
            self.sma, self.bollinger_lower, self.bollinger_upper, self.durbin_watson
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorEngine {
    pub sma_period: usize,
    pub bollinger_multiplier: f64,
    pub dw_window: usize,
}

impl IndicatorEngine {
    pub fn new(config: &StrategyConfig) -> Self {
        IndicatorEngine {
            sma_period: config.sma_period,
            bollinger_multiplier: config.bollinger_multiplier,
            dw_window: config.dw_window,
        }
    }

    /// Closes needed for SMA/Bollinger and changes needed for Durbin-Watson.
    pub fn required_closes(&self) -> usize {
        self.sma_period.max(self.dw_window + 1)
    }

    pub fn evaluate(&self, closes: &[f64], changes: &[f64]) -> IndicatorSnapshot {
        let sma = sma::sma(closes, self.sma_period);
        let bands = bollinger::bollinger_bands(closes, self.bollinger_multiplier, self.sma_period);
        let dw = durbin_watson::durbin_watson(changes, self.dw_window);

        match (sma, bands, dw) {
            (Some(sma), Some(bands), Some(dw)) => IndicatorSnapshot {
                sma,
                bollinger_lower: bands.lower,
                bollinger_upper: bands.upper,
                durbin_watson: dw,
                ready: true,
            },
            _ => IndicatorSnapshot::not_ready(),
        }
    }
}
