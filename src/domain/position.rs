//! Single-instrument position tracking.

use chrono::{DateTime, Utc};
use std::fmt;

use super::order::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Flat => f.write_str("flat"),
            PositionState::Long => f.write_str("long"),
            PositionState::Short => f.write_str("short"),
        }
    }
}

/// The one position held for an instrument. When not flat, `entry_price`
/// is positive and `quantity` is nonzero.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub state: PositionState,
    pub entry_price: f64,
    pub quantity: u32,
    pub stop_loss_fraction: f64,
    pub entry_time: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat(stop_loss_fraction: f64) -> Self {
        Position {
            state: PositionState::Flat,
            entry_price: 0.0,
            quantity: 0,
            stop_loss_fraction,
            entry_time: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.state == PositionState::Flat
    }

    pub fn is_long(&self) -> bool {
        self.state == PositionState::Long
    }

    pub fn is_short(&self) -> bool {
        self.state == PositionState::Short
    }

    /// Signed share count: positive long, negative short.
    pub fn signed_quantity(&self) -> i64 {
        match self.state {
            PositionState::Flat => 0,
            PositionState::Long => i64::from(self.quantity),
            PositionState::Short => -i64::from(self.quantity),
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.signed_quantity() as f64 * (price - self.entry_price)
    }

    /// Adverse move strictly beyond `entry_price * stop_loss_fraction`.
    pub fn should_stop_loss(&self, price: f64) -> bool {
        let limit = self.entry_price * self.stop_loss_fraction;
        match self.state {
            PositionState::Flat => false,
            PositionState::Long => (self.entry_price - price) > limit,
            PositionState::Short => (price - self.entry_price) > limit,
        }
    }

    /// Price has reverted to (or through) the moving average.
    pub fn should_take_profit(&self, price: f64, sma: f64) -> bool {
        match self.state {
            PositionState::Flat => false,
            PositionState::Long => price >= sma,
            PositionState::Short => price <= sma,
        }
    }

    /// Stop price for a protective order placed at entry.
    pub fn protective_stop(side: PositionState, price: f64, stop_loss_fraction: f64) -> Option<f64> {
        match side {
            PositionState::Flat => None,
            PositionState::Long => Some(price * (1.0 - stop_loss_fraction)),
            PositionState::Short => Some(price * (1.0 + stop_loss_fraction)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub symbol: String,
    pub side: PositionState,
    pub quantity: u32,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub pnl: f64,
}
