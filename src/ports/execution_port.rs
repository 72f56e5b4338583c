//! Order execution port.

use crate::domain::error::RevtraderError;
use crate::domain::order::{Fill, TradeIntent};

/// Carries out one trade intent and reports its fill.
///
/// Implementations either return the fill or an error; an error means the
/// order did not execute and the position must not change.
pub trait ExecutionPort {
    fn execute(&mut self, intent: &TradeIntent) -> Result<Fill, RevtraderError>;
}
