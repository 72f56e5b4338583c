//! Percent-change tracking over the close series.
//!
//! Keeps the close series and its bar-over-bar percentage change series
//! aligned index for index. Element 0 of the change series is the sentinel
//! 0.0 since the first bar has no predecessor.

use super::error::RevtraderError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PercentChangeTracker {
    closes: Vec<f64>,
    changes: Vec<f64>,
}

impl PercentChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a close and its percent change from the previous close.
    ///
    /// Fails without touching either series if the previous close is zero.
    pub fn append(&mut self, close: f64) -> Result<f64, RevtraderError> {
        let change = match self.closes.last() {
            None => 0.0,
            Some(&prev) if prev == 0.0 => {
                return Err(RevtraderError::malformed(
                    "percent change undefined: previous close is zero",
                ));
            }
            Some(&prev) => (close - prev) / prev * 100.0,
        };
        self.closes.push(close);
        self.changes.push(change);
        Ok(change)
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn changes(&self) -> &[f64] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }
}
