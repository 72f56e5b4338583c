//! Domain error types.

/// Top-level error type for revtrader.
#[derive(Debug, thiserror::Error)]
pub enum RevtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("malformed market data: {reason}")]
    MalformedMarketData { reason: String },

    #[error("order rejected: {reason}")]
    ExecutionRejected { reason: String },

    #[error("order dispatch failed after {attempts} attempts: {reason}")]
    DispatchFailed { attempts: u32, reason: String },

    /// The broker may hold a position the session does not know about.
    #[error("order {client_order_id} state unknown: {reason}")]
    Unreconciled {
        client_order_id: String,
        reason: String,
    },

    #[error("transport failure: {reason}")]
    Transport { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RevtraderError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        RevtraderError::MalformedMarketData {
            reason: reason.into(),
        }
    }

    /// Errors that only cost the current tick; the run carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RevtraderError::MalformedMarketData { .. }
                | RevtraderError::ExecutionRejected { .. }
                | RevtraderError::DispatchFailed { .. }
                | RevtraderError::Transport { .. }
        )
    }

    /// Process exit status for the error family.
    pub fn exit_status(&self) -> u8 {
        match self {
            RevtraderError::Io(_) => 1,
            RevtraderError::ConfigParse { .. }
            | RevtraderError::ConfigMissing { .. }
            | RevtraderError::ConfigInvalid { .. } => 2,
            RevtraderError::NoData { .. }
            | RevtraderError::InsufficientData { .. }
            | RevtraderError::MalformedMarketData { .. } => 3,
            RevtraderError::ExecutionRejected { .. }
            | RevtraderError::DispatchFailed { .. }
            | RevtraderError::Unreconciled { .. } => 4,
            RevtraderError::Transport { .. } => 5,
        }
    }
}

impl From<&RevtraderError> for std::process::ExitCode {
    fn from(err: &RevtraderError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
