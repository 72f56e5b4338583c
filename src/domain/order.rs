//! Typed records crossing the execution boundary.

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Day => "day",
            TimeInForce::Gtc => "gtc",
            TimeInForce::Ioc => "ioc",
            TimeInForce::Fok => "fok",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "day" => Some(TimeInForce::Day),
            "gtc" => Some(TimeInForce::Gtc),
            "ioc" => Some(TimeInForce::Ioc),
            "fok" => Some(TimeInForce::Fok),
            _ => None,
        }
    }
}

/// Market order as sent to the execution port.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub time_in_force: TimeInForce,
    /// Protective stop attached to an entry (one-triggers-other order).
    pub stop_price: Option<f64>,
}

/// Why a position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => f.write_str("stop-loss"),
            ExitReason::TakeProfit => f.write_str("take-profit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    OpenLong,
    OpenShort,
    Close(ExitReason),
}

/// A transition the state machine wants carried out.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub kind: IntentKind,
    pub order: OrderIntent,
    /// Close of the bar that produced the intent.
    pub reference_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl TradeIntent {
    pub fn is_entry(&self) -> bool {
        matches!(self.kind, IntentKind::OpenLong | IntentKind::OpenShort)
    }
}

/// Execution report for a trade intent. `quantity` is what actually
/// filled, which can be short of the order after a cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub client_order_id: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}
