//! Position state machine.
//!
//! States are Flat, Long and Short. Each tick is evaluated once, in a fixed
//! order that stops at the first rule that fires:
//!
//! 1. wait while warming up, while indicators are not ready, or while an
//!    earlier intent has no execution result yet
//! 2. Flat -> Short: DW in the entry band and close above the upper band
//! 3. Flat -> Long: DW in the entry band and close below the lower band
//! 4. held side -> Flat on stop-loss
//! 5. held side -> Flat on take-profit (close back through the SMA)
//!
//! An emitted intent is only applied to the position once its fill is
//! confirmed; a rejection leaves the position as it was.

use chrono::{DateTime, Utc};

use super::error::RevtraderError;
use super::indicator::IndicatorSnapshot;
use super::order::{ExitReason, Fill, IntentKind, OrderIntent, OrderSide, TimeInForce, TradeIntent};
use super::position::{ClosedTrade, Position, PositionState};
use super::strategy::StrategyConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Warmup { bars_seen: usize, required: usize },
    NotReady,
    AwaitingFill,
    Hold,
    Signal(TradeIntent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened {
        state: PositionState,
        entry_price: f64,
        quantity: u32,
    },
    Closed(ClosedTrade),
}

#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    symbol: String,
    config: StrategyConfig,
    time_in_force: TimeInForce,
    position: Position,
    pending: Option<TradeIntent>,
    next_intent_id: u64,
}

impl PositionStateMachine {
    pub fn new(symbol: impl Into<String>, config: StrategyConfig) -> Self {
        let position = Position::flat(config.stop_loss_fraction);
        PositionStateMachine {
            symbol: symbol.into(),
            config,
            time_in_force: TimeInForce::Gtc,
            position,
            pending: None,
            next_intent_id: 1,
        }
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn pending(&self) -> Option<&TradeIntent> {
        self.pending.as_ref()
    }

    /// Runs the transition rules for one tick.
    pub fn evaluate(
        &mut self,
        snapshot: &IndicatorSnapshot,
        close: f64,
        bars_seen: usize,
        timestamp: DateTime<Utc>,
    ) -> Decision {
        if bars_seen < self.config.warmup_bars {
            return Decision::Warmup {
                bars_seen,
                required: self.config.warmup_bars,
            };
        }
        if !snapshot.ready {
            return Decision::NotReady;
        }
        if self.pending.is_some() {
            return Decision::AwaitingFill;
        }

        let kind = match self.position.state {
            PositionState::Flat => {
                if !self.config.dw_in_entry_band(snapshot.durbin_watson) {
                    None
                } else if close > snapshot.bollinger_upper {
                    Some(IntentKind::OpenShort)
                } else if close < snapshot.bollinger_lower {
                    Some(IntentKind::OpenLong)
                } else {
                    None
                }
            }
            PositionState::Long | PositionState::Short => {
                if self.position.should_stop_loss(close) {
                    Some(IntentKind::Close(ExitReason::StopLoss))
                } else if self.position.should_take_profit(close, snapshot.sma) {
                    Some(IntentKind::Close(ExitReason::TakeProfit))
                } else {
                    None
                }
            }
        };

        match kind {
            None => Decision::Hold,
            Some(kind) => {
                let intent = self.build_intent(kind, close, timestamp);
                self.pending = Some(intent.clone());
                Decision::Signal(intent)
            }
        }
    }

    fn build_intent(&mut self, kind: IntentKind, close: f64, timestamp: DateTime<Utc>) -> TradeIntent {
        let (side, quantity, stop_price) = match kind {
            IntentKind::OpenLong => (
                OrderSide::Buy,
                self.config.lot_size,
                self.entry_stop(PositionState::Long, close),
            ),
            IntentKind::OpenShort => (
                OrderSide::Sell,
                self.config.lot_size,
                self.entry_stop(PositionState::Short, close),
            ),
            IntentKind::Close(_) => {
                let side = if self.position.is_long() {
                    OrderSide::Sell
                } else {
                    OrderSide::Buy
                };
                (side, self.position.quantity, None)
            }
        };

        let id = self.next_intent_id;
        self.next_intent_id += 1;

        TradeIntent {
            kind,
            order: OrderIntent {
                client_order_id: format!(
                    "rev-{}-{}-{}",
                    self.symbol,
                    timestamp.timestamp_millis(),
                    id
                ),
                symbol: self.symbol.clone(),
                side,
                quantity,
                time_in_force: self.time_in_force,
                stop_price,
            },
            reference_price: close,
            timestamp,
        }
    }

    fn entry_stop(&self, side: PositionState, close: f64) -> Option<f64> {
        if !self.config.attach_stop_order {
            return None;
        }
        Position::protective_stop(side, close, self.config.stop_loss_fraction)
    }

    /// Applies the execution result for the outstanding intent.
    pub fn confirm_fill(&mut self, fill: &Fill) -> Result<Transition, RevtraderError> {
        let intent = match &self.pending {
            Some(intent) if intent.order.client_order_id == fill.client_order_id => intent.clone(),
            Some(intent) => {
                return Err(RevtraderError::ExecutionRejected {
                    reason: format!(
                        "fill for {} does not match outstanding order {}",
                        fill.client_order_id, intent.order.client_order_id
                    ),
                });
            }
            None => {
                return Err(RevtraderError::ExecutionRejected {
                    reason: format!("fill for {} with no order outstanding", fill.client_order_id),
                });
            }
        };
        self.pending = None;

        if fill.side != intent.order.side {
            return Err(RevtraderError::ExecutionRejected {
                reason: format!(
                    "fill for {} is a {} but the order was a {}",
                    fill.client_order_id, fill.side, intent.order.side
                ),
            });
        }
        if !fill.price.is_finite() || fill.price <= 0.0 || fill.quantity == 0 {
            return Err(RevtraderError::ExecutionRejected {
                reason: format!(
                    "unusable fill for {}: {} @ {}",
                    fill.client_order_id, fill.quantity, fill.price
                ),
            });
        }

        match intent.kind {
            IntentKind::OpenLong | IntentKind::OpenShort => {
                let state = if intent.kind == IntentKind::OpenLong {
                    PositionState::Long
                } else {
                    PositionState::Short
                };
                self.position = Position {
                    state,
                    entry_price: fill.price,
                    quantity: fill.quantity,
                    stop_loss_fraction: self.config.stop_loss_fraction,
                    entry_time: Some(fill.timestamp),
                };
                Ok(Transition::Opened {
                    state,
                    entry_price: fill.price,
                    quantity: fill.quantity,
                })
            }
            IntentKind::Close(reason) => {
                let trade = ClosedTrade {
                    symbol: self.symbol.clone(),
                    side: self.position.state,
                    quantity: self.position.quantity,
                    entry_price: self.position.entry_price,
                    exit_price: fill.price,
                    entry_time: self.position.entry_time,
                    exit_time: fill.timestamp,
                    exit_reason: reason,
                    pnl: self.position.unrealized_pnl(fill.price),
                };
                self.position = Position::flat(self.config.stop_loss_fraction);
                Ok(Transition::Closed(trade))
            }
        }
    }

    /// Drops the outstanding intent; the position is left untouched.
    pub fn reject_pending(&mut self) -> Option<TradeIntent> {
        self.pending.take()
    }
}
