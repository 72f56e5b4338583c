//! Backtest driver.
//!
//! Replays historical bars through a [`TradingSession`] with simulated
//! execution. Each symbol runs against its own account; there is no shared
//! cash between symbols.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::bar::Bar;
use super::error::RevtraderError;
use super::execution::SimulatedExecution;
use super::ledger::Ledger;
use super::position::{ClosedTrade, PositionState};
use super::session::TradingSession;
use super::state_machine::Decision;
use super::strategy::StrategyConfig;
use crate::ports::execution_port::ExecutionPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_cash: Decimal,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Maximum bars requested per symbol.
    pub limit: usize,
    pub timeframe: String,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub symbol: String,
    pub ledger: Ledger,
    pub trades: Vec<ClosedTrade>,
    /// Cash plus open shares marked at the last good close.
    pub final_value: Decimal,
    /// Position still held when the data ran out.
    pub open_position: PositionState,
    pub bars_processed: usize,
    pub bars_skipped: usize,
    pub orders_rejected: usize,
}

/// Runs one symbol's bars, oldest first, through the strategy.
///
/// Malformed bars and rejected fills are logged and skipped. Fewer usable
/// bars than the warmup needs is an error.
pub fn run_backtest(
    symbol: &str,
    bars: &[Bar],
    strategy: &StrategyConfig,
    initial_cash: Decimal,
) -> Result<BacktestResult, RevtraderError> {
    if bars.is_empty() {
        return Err(RevtraderError::NoData {
            symbol: symbol.to_string(),
        });
    }

    let mut session = TradingSession::new(symbol, strategy.clone());
    let mut execution = SimulatedExecution::new(initial_cash);

    for bar in bars {
        let decision = match session.on_bar(bar) {
            Ok(decision) => decision,
            Err(e) if e.is_recoverable() => continue,
            Err(e) => return Err(e),
        };

        execution.mark(bar);
        if let Decision::Signal(intent) = decision {
            let result = execution.execute(&intent);
            if let Err(e) = session.apply_execution(result) {
                if !e.is_recoverable() {
                    return Err(e);
                }
            }
        }
        execution.record_equity()?;
    }

    if session.bars_seen() < strategy.warmup_bars {
        return Err(RevtraderError::InsufficientData {
            symbol: symbol.to_string(),
            bars: session.bars_seen(),
            minimum: strategy.warmup_bars,
        });
    }
    if session.skipped_bars() > 0 {
        warn!(symbol, skipped = session.skipped_bars(), "malformed bars were skipped");
    }

    let final_value = execution.portfolio_value()?;
    let open_position = session.position().state;
    let bars_processed = session.bars_seen();
    let bars_skipped = session.skipped_bars();
    let orders_rejected = session.rejected_orders();
    let trades = session.into_trades();

    info!(
        symbol,
        bars = bars_processed,
        trades = trades.len(),
        final_value = %final_value,
        "backtest complete"
    );

    Ok(BacktestResult {
        symbol: symbol.to_string(),
        ledger: execution.into_ledger(),
        trades,
        final_value,
        open_position,
        bars_processed,
        bars_skipped,
        orders_rejected,
    })
}
