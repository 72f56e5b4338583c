//! Price bar representation.

use chrono::{DateTime, NaiveDate, Utc};

use super::error::RevtraderError;

/// One observation for a fixed interval. Only the close is required by the
/// decision logic; historical sources may omit the open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub close: f64,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Self {
        Bar {
            timestamp,
            open: None,
            close,
        }
    }

    pub fn with_open(timestamp: DateTime<Utc>, open: f64, close: f64) -> Self {
        Bar {
            timestamp,
            open: Some(open),
            close,
        }
    }

    /// Rejects bars whose prices are zero, negative, or not finite.
    pub fn validate(&self) -> Result<(), RevtraderError> {
        if !self.close.is_finite() || self.close <= 0.0 {
            return Err(RevtraderError::malformed(format!(
                "close {} at {} is not a positive price",
                self.close, self.timestamp
            )));
        }
        if let Some(open) = self.open {
            if !open.is_finite() || open <= 0.0 {
                return Err(RevtraderError::malformed(format!(
                    "open {} at {} is not a positive price",
                    open, self.timestamp
                )));
            }
        }
        Ok(())
    }

    /// (close - open) / open * 100, when the open is known.
    pub fn intrabar_change_pct(&self) -> Option<f64> {
        self.open.map(|open| (self.close - open) / open * 100.0)
    }
}

/// Parses an RFC-3339 timestamp, or a bare `YYYY-MM-DD` date taken as
/// midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
