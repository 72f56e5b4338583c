//! Cash and share accounting for one simulated account.
//!
//! Cash is kept as a `Decimal` so that buying and selling the same quantity
//! at the same price returns the balance to exactly where it started.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use super::error::RevtraderError;
use super::order::{Fill, OrderSide};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub cash: Decimal,
    pub initial_cash: Decimal,
    /// Signed share count: negative while short.
    pub shares: i64,
    pub equity_curve: Vec<EquityPoint>,
}

impl Ledger {
    pub fn new(initial_cash: Decimal) -> Self {
        Ledger {
            cash: initial_cash,
            initial_cash,
            shares: 0,
            equity_curve: Vec::new(),
        }
    }

    /// Buys debit `price * quantity`, sells credit it.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<(), RevtraderError> {
        let price = to_decimal(fill.price)?;
        let notional = price * Decimal::from(fill.quantity);
        let quantity = i64::from(fill.quantity);
        match fill.side {
            OrderSide::Buy => {
                self.cash -= notional;
                self.shares += quantity;
            }
            OrderSide::Sell => {
                self.cash += notional;
                self.shares -= quantity;
            }
        }
        Ok(())
    }

    /// Cash plus shares valued at `close`.
    pub fn market_value(&self, close: f64) -> Result<Decimal, RevtraderError> {
        let price = to_decimal(close)?;
        Ok(self.cash + price * Decimal::from(self.shares))
    }

    pub fn record_equity(&mut self, timestamp: DateTime<Utc>, close: f64) -> Result<(), RevtraderError> {
        let value = self.market_value(close)?;
        self.equity_curve.push(EquityPoint {
            timestamp,
            equity: value.to_f64().unwrap_or(0.0),
        });
        Ok(())
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.cash - self.initial_cash
    }
}

fn to_decimal(price: f64) -> Result<Decimal, RevtraderError> {
    Decimal::from_f64(price)
        .ok_or_else(|| RevtraderError::malformed(format!("price {price} is not representable")))
}
