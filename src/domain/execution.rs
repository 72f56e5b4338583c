//! Simulated fills for backtests.
//!
//! Market orders fill in full at the close of the bar that produced them,
//! with no slippage or commission. Cash movements go through the [`Ledger`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::bar::Bar;
use super::error::RevtraderError;
use super::ledger::Ledger;
use super::order::{Fill, TradeIntent};
use crate::ports::execution_port::ExecutionPort;

#[derive(Debug, Clone)]
pub struct SimulatedExecution {
    ledger: Ledger,
    last_mark: Option<(DateTime<Utc>, f64)>,
}

impl SimulatedExecution {
    pub fn new(initial_cash: Decimal) -> Self {
        SimulatedExecution {
            ledger: Ledger::new(initial_cash),
            last_mark: None,
        }
    }

    /// Sets the price orders fill at until the next bar.
    pub fn mark(&mut self, bar: &Bar) {
        self.last_mark = Some((bar.timestamp, bar.close));
    }

    /// Appends an equity point at the current mark.
    pub fn record_equity(&mut self) -> Result<(), RevtraderError> {
        if let Some((timestamp, close)) = self.last_mark {
            self.ledger.record_equity(timestamp, close)?;
        }
        Ok(())
    }

    /// Account value at the current mark, or cash if nothing has traded yet.
    pub fn portfolio_value(&self) -> Result<Decimal, RevtraderError> {
        match self.last_mark {
            Some((_, close)) => self.ledger.market_value(close),
            None => Ok(self.ledger.cash),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }
}

impl ExecutionPort for SimulatedExecution {
    fn execute(&mut self, intent: &TradeIntent) -> Result<Fill, RevtraderError> {
        let (timestamp, close) = self.last_mark.ok_or_else(|| RevtraderError::ExecutionRejected {
            reason: format!("no market price for {}", intent.order.symbol),
        })?;

        let fill = Fill {
            client_order_id: intent.order.client_order_id.clone(),
            side: intent.order.side,
            quantity: intent.order.quantity,
            price: close,
            timestamp,
        };
        self.ledger.apply_fill(&fill)?;
        Ok(fill)
    }
}
