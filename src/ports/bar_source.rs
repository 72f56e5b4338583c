//! Market data ports.

use chrono::{DateTime, Utc};

use crate::domain::bar::Bar;
use crate::domain::error::RevtraderError;

/// A historical bar query for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRequest {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Upper bound on bars returned.
    pub limit: usize,
    /// Bar width, e.g. `1Min`.
    pub timeframe: String,
}

/// Source of historical bars, oldest first.
pub trait BarSource {
    fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, RevtraderError>;
}

/// Push-style feed of closed bars for one subscribed symbol.
pub trait LiveBarFeed {
    /// (Re)establishes the connection and subscription.
    fn connect(&mut self) -> Result<(), RevtraderError>;

    /// Blocks until the next bar. `Ok(None)` means the feed ended cleanly.
    fn next_bar(&mut self) -> Result<Option<Bar>, RevtraderError>;
}
