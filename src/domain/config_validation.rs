//! Configuration loading and validation.
//!
//! Every section is read into its typed settings here, so that a bad value
//! is reported with its `[section] key` before any command starts work.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::backtest::BacktestConfig;
use crate::domain::bar::parse_timestamp;
use crate::domain::error::RevtraderError;
use crate::domain::order::TimeInForce;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;

/// Order submission policy for a brokerage execution port.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    pub max_retries: u32,
    /// HTTP statuses that are retried rather than treated as rejections.
    pub retry_codes: Vec<u16>,
    /// Base delay; doubles after every failed attempt.
    pub backoff: Duration,
    pub timeout: Duration,
    pub time_in_force: TimeInForce,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings {
            max_retries: 3,
            retry_codes: vec![429, 504],
            backoff: Duration::from_millis(500),
            timeout: Duration::from_millis(10_000),
            time_in_force: TimeInForce::Gtc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    pub symbol: String,
    pub reconnect_delay: Duration,
    /// Consecutive failed reconnects before the loop gives up.
    pub max_reconnects: u32,
    /// How long to wait for an outstanding order once the feed ends.
    pub fill_timeout: Duration,
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), RevtraderError> {
    load_strategy_config(config).map(|_| ())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RevtraderError> {
    load_backtest_config(config)?;
    resolve_symbols(None, config)?;
    Ok(())
}

pub fn validate_execution_config(config: &dyn ConfigPort) -> Result<(), RevtraderError> {
    load_execution_settings(config).map(|_| ())
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), RevtraderError> {
    load_live_settings(config, None).map(|_| ())
}

/// Reads `[strategy]`, filling unset keys from [`StrategyConfig::default`].
pub fn load_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, RevtraderError> {
    let d = StrategyConfig::default();
    let strategy = StrategyConfig {
        stop_loss_fraction: read_number(config, "strategy", "stop_loss_fraction", d.stop_loss_fraction)?,
        lot_size: read_number(config, "strategy", "lot_size", d.lot_size)?,
        bollinger_multiplier: read_number(
            config,
            "strategy",
            "bollinger_multiplier",
            d.bollinger_multiplier,
        )?,
        sma_period: read_number(config, "strategy", "sma_period", d.sma_period)?,
        dw_window: read_number(config, "strategy", "dw_window", d.dw_window)?,
        warmup_bars: read_number(config, "strategy", "warmup_bars", d.warmup_bars)?,
        dw_lower: read_number(config, "strategy", "dw_lower", d.dw_lower)?,
        dw_upper: read_number(config, "strategy", "dw_upper", d.dw_upper)?,
        attach_stop_order: read_bool(config, "strategy", "attach_stop_order", d.attach_stop_order)?,
    };
    strategy.validate()?;
    Ok(strategy)
}

pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, RevtraderError> {
    let initial_cash: Decimal = read_number(config, "backtest", "initial_cash", Decimal::from(100_000))?;
    if initial_cash <= Decimal::ZERO {
        return Err(invalid("backtest", "initial_cash", "initial_cash must be positive"));
    }

    let start = read_timestamp(config, "start")?;
    let end = read_timestamp(config, "end")?;
    if start >= end {
        return Err(invalid("backtest", "start", "start must be before end"));
    }

    let limit: usize = read_number(config, "backtest", "limit", 500)?;
    if limit == 0 {
        return Err(invalid("backtest", "limit", "limit must be at least 1"));
    }

    let timeframe = config
        .get_string("backtest", "timeframe")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "1Min".to_string());
    if !is_valid_timeframe(&timeframe) {
        return Err(invalid(
            "backtest",
            "timeframe",
            &format!("unrecognised timeframe {timeframe:?}, expected e.g. 1Min, 15Min, 1Hour, 1Day"),
        ));
    }

    Ok(BacktestConfig {
        initial_cash,
        start,
        end,
        limit,
        timeframe,
    })
}

pub fn load_execution_settings(config: &dyn ConfigPort) -> Result<ExecutionSettings, RevtraderError> {
    let d = ExecutionSettings::default();

    let retry_codes = match config.get_string("execution", "retry_codes") {
        Some(raw) => parse_retry_codes(&raw)?,
        None => d.retry_codes,
    };

    let timeout_ms: u64 = read_number(config, "execution", "timeout_ms", 10_000)?;
    if timeout_ms == 0 {
        return Err(invalid("execution", "timeout_ms", "timeout_ms must be positive"));
    }

    let time_in_force = match config.get_string("execution", "time_in_force") {
        Some(raw) => TimeInForce::parse(&raw).ok_or_else(|| {
            invalid(
                "execution",
                "time_in_force",
                &format!("unknown time_in_force {raw:?}, expected day, gtc, ioc or fok"),
            )
        })?,
        None => d.time_in_force,
    };

    Ok(ExecutionSettings {
        max_retries: read_number(config, "execution", "max_retries", d.max_retries)?,
        retry_codes,
        backoff: Duration::from_millis(read_number(config, "execution", "backoff_ms", 500)?),
        timeout: Duration::from_millis(timeout_ms),
        time_in_force,
    })
}

/// Reads `[live]`. A symbol given on the command line wins over the file.
pub fn load_live_settings(
    config: &dyn ConfigPort,
    symbol_override: Option<&str>,
) -> Result<LiveSettings, RevtraderError> {
    let symbol = symbol_override
        .map(str::to_string)
        .or_else(|| config.get_string("live", "symbol"))
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("live", "symbol"))?;

    Ok(LiveSettings {
        symbol,
        reconnect_delay: Duration::from_millis(read_number(config, "live", "reconnect_delay_ms", 5_000)?),
        max_reconnects: read_number(config, "live", "max_reconnects", 10)?,
        fill_timeout: Duration::from_millis(read_number(config, "live", "fill_timeout_ms", 30_000)?),
    })
}

/// Symbols to backtest: the override if given, else `symbols`, else
/// `symbol`. Upper-cased; empty entries and duplicates are errors.
pub fn resolve_symbols(
    symbol_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, RevtraderError> {
    let (key, raw) = match symbol_override {
        Some(s) => ("symbols", Some(s.to_string())),
        None => match config.get_string("backtest", "symbols") {
            Some(s) => ("symbols", Some(s)),
            None => ("symbol", config.get_string("backtest", "symbol")),
        },
    };
    let raw = raw.ok_or_else(|| missing("backtest", "symbols"))?;
    parse_symbols(&raw).map_err(|reason| invalid("backtest", key, &reason))
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, String> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err("empty entry in symbol list".to_string());
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(format!("duplicate symbol {symbol}"));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

pub fn parse_retry_codes(input: &str) -> Result<Vec<u16>, RevtraderError> {
    let mut codes = Vec::new();
    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let code: u16 = token.parse().map_err(|_| {
            invalid("execution", "retry_codes", &format!("{token:?} is not an HTTP status"))
        })?;
        if !(100..=599).contains(&code) {
            return Err(invalid(
                "execution",
                "retry_codes",
                &format!("{code} is not an HTTP status"),
            ));
        }
        codes.push(code);
    }
    Ok(codes)
}

/// Typed read of an optional key; a present but unparseable value is an
/// error rather than a silent default.
pub fn read_number<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, RevtraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(section, key, &format!("{:?} is not a valid number", raw.trim()))),
    }
}

pub fn read_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, RevtraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(invalid(section, key, &format!("{other:?} is not a boolean"))),
        },
    }
}

fn read_timestamp(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RevtraderError> {
    let raw = config
        .get_string("backtest", key)
        .ok_or_else(|| missing("backtest", key))?;
    parse_timestamp(&raw).ok_or_else(|| {
        invalid(
            "backtest",
            key,
            &format!("invalid {key} {raw:?}, expected RFC-3339 or YYYY-MM-DD"),
        )
    })
}

fn is_valid_timeframe(value: &str) -> bool {
    let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    matches!(&value[digits..], "Min" | "Hour" | "Day" | "Week" | "Month")
}

fn missing(section: &str, key: &str) -> RevtraderError {
    RevtraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> RevtraderError {
    RevtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
