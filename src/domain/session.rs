//! Per-symbol trading context.
//!
//! A session owns every piece of mutable state for one instrument: the
//! price and percent-change series, the indicator engine, the position
//! state machine and the closed-trade log. Backtest and live drivers feed it
//! bars and execution results; neither keeps state of its own.

use tracing::{debug, info, warn};

use super::bar::Bar;
use super::error::RevtraderError;
use super::indicator::{IndicatorEngine, IndicatorSnapshot};
use super::order::{Fill, TimeInForce};
use super::percent_change::PercentChangeTracker;
use super::position::{ClosedTrade, Position};
use super::state_machine::{Decision, PositionStateMachine, Transition};
use super::strategy::StrategyConfig;

#[derive(Debug, Clone)]
pub struct TradingSession {
    symbol: String,
    tracker: PercentChangeTracker,
    engine: IndicatorEngine,
    machine: PositionStateMachine,
    last_snapshot: IndicatorSnapshot,
    trades: Vec<ClosedTrade>,
    skipped_bars: usize,
    rejected_orders: usize,
}

impl TradingSession {
    pub fn new(symbol: impl Into<String>, config: StrategyConfig) -> Self {
        Self::with_time_in_force(symbol, config, TimeInForce::Gtc)
    }

    pub fn with_time_in_force(
        symbol: impl Into<String>,
        config: StrategyConfig,
        time_in_force: TimeInForce,
    ) -> Self {
        let symbol = symbol.into();
        let engine = IndicatorEngine::new(&config);
        let machine =
            PositionStateMachine::new(symbol.clone(), config).with_time_in_force(time_in_force);
        TradingSession {
            symbol,
            tracker: PercentChangeTracker::new(),
            engine,
            machine,
            last_snapshot: IndicatorSnapshot::not_ready(),
            trades: Vec::new(),
            skipped_bars: 0,
            rejected_orders: 0,
        }
    }

    /// Feeds one bar through the series, the indicators and the state
    /// machine.
    ///
    /// A malformed bar is counted, logged and returned as an error without
    /// touching any series. While an intent is outstanding the series still
    /// advance but no new decision is made.
    pub fn on_bar(&mut self, bar: &Bar) -> Result<Decision, RevtraderError> {
        if let Err(e) = bar.validate().and_then(|()| self.tracker.append(bar.close).map(|_| ())) {
            self.skipped_bars += 1;
            warn!(symbol = %self.symbol, timestamp = %bar.timestamp, error = %e, "skipping bar");
            return Err(e);
        }

        if let Some(change) = bar.intrabar_change_pct() {
            debug!(symbol = %self.symbol, change, "intrabar move");
        }

        let snapshot = self
            .engine
            .evaluate(self.tracker.closes(), self.tracker.changes());
        self.last_snapshot = snapshot;

        let decision =
            self.machine
                .evaluate(&snapshot, bar.close, self.tracker.len(), bar.timestamp);

        match &decision {
            Decision::Signal(intent) => info!(
                symbol = %self.symbol,
                kind = ?intent.kind,
                side = %intent.order.side,
                quantity = intent.order.quantity,
                price = bar.close,
                indicators = %snapshot,
                "signal"
            ),
            Decision::AwaitingFill => debug!(symbol = %self.symbol, "order outstanding, holding"),
            _ => debug!(symbol = %self.symbol, close = bar.close, indicators = %snapshot, "tick"),
        }

        Ok(decision)
    }

    /// Applies the outcome of executing the outstanding intent.
    ///
    /// A failed execution clears the intent and leaves the position alone;
    /// the original error is handed back to the caller.
    pub fn apply_execution(
        &mut self,
        result: Result<Fill, RevtraderError>,
    ) -> Result<Transition, RevtraderError> {
        let fill = match result {
            Ok(fill) => fill,
            Err(e) => {
                self.rejected_orders += 1;
                if let Some(intent) = self.machine.reject_pending() {
                    warn!(
                        symbol = %self.symbol,
                        client_order_id = %intent.order.client_order_id,
                        error = %e,
                        "order not executed, position unchanged"
                    );
                }
                return Err(e);
            }
        };

        let transition = match self.machine.confirm_fill(&fill) {
            Ok(t) => t,
            Err(e) => {
                self.rejected_orders += 1;
                warn!(symbol = %self.symbol, error = %e, "fill not applied");
                return Err(e);
            }
        };

        match &transition {
            Transition::Opened {
                state,
                entry_price,
                quantity,
            } => info!(symbol = %self.symbol, %state, entry_price, quantity, "position opened"),
            Transition::Closed(trade) => {
                info!(
                    symbol = %self.symbol,
                    reason = %trade.exit_reason,
                    exit_price = trade.exit_price,
                    pnl = trade.pnl,
                    "position closed"
                );
                self.trades.push(trade.clone());
            }
        }
        Ok(transition)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn position(&self) -> &Position {
        self.machine.position()
    }

    pub fn has_pending(&self) -> bool {
        self.machine.pending().is_some()
    }

    pub fn last_snapshot(&self) -> &IndicatorSnapshot {
        &self.last_snapshot
    }

    pub fn bars_seen(&self) -> usize {
        self.tracker.len()
    }

    pub fn closes(&self) -> &[f64] {
        self.tracker.closes()
    }

    pub fn changes(&self) -> &[f64] {
        self.tracker.changes()
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<ClosedTrade> {
        self.trades
    }

    pub fn skipped_bars(&self) -> usize {
        self.skipped_bars
    }

    pub fn rejected_orders(&self) -> usize {
        self.rejected_orders
    }
}
