//! Alpaca brokerage adapters.
//!
//! - [`rest::AlpacaRest`]: historical bars, order submission and account
//!   queries over the REST API
//! - [`stream::AlpacaBarStream`]: minute bars over the market-data websocket

pub mod rest;
pub mod stream;
pub mod types;

use std::env;
use std::fmt;

use crate::domain::error::RevtraderError;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_TRADING_URL: &str = "https://paper-api.alpaca.markets";
pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";
pub const DEFAULT_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2/iex";

pub const KEY_ID_ENV: &str = "APCA_API_KEY_ID";
pub const SECRET_KEY_ENV: &str = "APCA_API_SECRET_KEY";

#[derive(Clone, PartialEq)]
pub struct AlpacaCredentials {
    pub key_id: String,
    pub secret_key: String,
}

impl fmt::Debug for AlpacaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlpacaCredentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl AlpacaCredentials {
    /// `[alpaca] key_id` / `secret_key`, falling back to the standard
    /// `APCA_*` environment variables.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RevtraderError> {
        Ok(AlpacaCredentials {
            key_id: lookup(config, "key_id", KEY_ID_ENV)?,
            secret_key: lookup(config, "secret_key", SECRET_KEY_ENV)?,
        })
    }
}

fn lookup(config: &dyn ConfigPort, key: &str, env_var: &str) -> Result<String, RevtraderError> {
    config
        .get_string("alpaca", key)
        .or_else(|| env::var(env_var).ok().filter(|v| !v.trim().is_empty()))
        .map(|v| v.trim().to_string())
        .ok_or_else(|| RevtraderError::ConfigMissing {
            section: "alpaca".to_string(),
            key: key.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlpacaEndpoints {
    pub trading_url: String,
    pub data_url: String,
    pub stream_url: String,
}

impl Default for AlpacaEndpoints {
    fn default() -> Self {
        AlpacaEndpoints {
            trading_url: DEFAULT_TRADING_URL.to_string(),
            data_url: DEFAULT_DATA_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
        }
    }
}

impl AlpacaEndpoints {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = AlpacaEndpoints::default();
        let url = |key: &str, default: String| {
            config
                .get_string("alpaca", key)
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .unwrap_or(default)
        };
        AlpacaEndpoints {
            trading_url: url("trading_url", d.trading_url),
            data_url: url("data_url", d.data_url),
            stream_url: url("stream_url", d.stream_url),
        }
    }
}
