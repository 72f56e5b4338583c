#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use revtrader::domain::error::RevtraderError;
pub use revtrader::domain::bar::Bar;
use revtrader::domain::order::{Fill, TradeIntent};
use revtrader::domain::strategy::StrategyConfig;
use revtrader::ports::bar_source::{BarRequest, BarSource, LiveBarFeed};
use revtrader::ports::execution_port::ExecutionPort;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// 2021-06-01 13:30 UTC plus `minute` minutes.
pub fn ts(minute: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 1, 13, 30, 0).unwrap() + Duration::minutes(minute as i64)
}

pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(ts(i), c))
        .collect()
}

/// 29 closes cycling 100, 102, 101, 99: indicators ready, never outside
/// the bands, Durbin-Watson inside the entry band once a shock arrives.
pub fn quiet_closes() -> Vec<f64> {
    let pattern = [100.0, 102.0, 101.0, 99.0];
    (0..29).map(|i| pattern[i % 4]).collect()
}

pub fn closes_then(tail: &[f64]) -> Vec<f64> {
    let mut closes = quiet_closes();
    closes.extend_from_slice(tail);
    closes
}

pub fn strategy(lot_size: u32) -> StrategyConfig {
    StrategyConfig {
        lot_size,
        ..Default::default()
    }
}

pub struct MockBarSource {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockBarSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl BarSource for MockBarSource {
    fn fetch_bars(&self, request: &BarRequest) -> Result<Vec<Bar>, RevtraderError> {
        if let Some(reason) = self.errors.get(&request.symbol) {
            return Err(RevtraderError::Transport {
                reason: reason.clone(),
            });
        }
        match self.data.get(&request.symbol) {
            Some(bars) if !bars.is_empty() => Ok(bars.clone()),
            _ => Err(RevtraderError::NoData {
                symbol: request.symbol.clone(),
            }),
        }
    }
}

/// Scripted feed events.
pub enum FeedEvent {
    Bar(Bar),
    Drop,
}

/// Replays a script; `Drop` simulates a lost connection. Connect attempts
/// fail while `failing_connects` is above zero.
pub struct MockFeed {
    pub events: VecDeque<FeedEvent>,
    pub connects: usize,
    pub failing_connects: usize,
    connected: bool,
}

impl MockFeed {
    pub fn new(events: Vec<FeedEvent>) -> Self {
        Self {
            events: events.into(),
            connects: 0,
            failing_connects: 0,
            connected: false,
        }
    }

    pub fn from_closes(closes: &[f64]) -> Self {
        Self::new(make_bars(closes).into_iter().map(FeedEvent::Bar).collect())
    }
}

impl LiveBarFeed for MockFeed {
    fn connect(&mut self) -> Result<(), RevtraderError> {
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            return Err(RevtraderError::Transport {
                reason: "refused".into(),
            });
        }
        self.connects += 1;
        self.connected = true;
        Ok(())
    }

    fn next_bar(&mut self) -> Result<Option<Bar>, RevtraderError> {
        if !self.connected {
            return Err(RevtraderError::Transport {
                reason: "not connected".into(),
            });
        }
        match self.events.pop_front() {
            Some(FeedEvent::Bar(bar)) => Ok(Some(bar)),
            Some(FeedEvent::Drop) => {
                self.connected = false;
                Err(RevtraderError::Transport {
                    reason: "connection reset".into(),
                })
            }
            None => Ok(None),
        }
    }
}

/// Fills every intent at its reference price, or fails with the queued
/// errors first. Submitted intents are shared so tests can inspect them
/// after the port has moved to the dispatcher thread.
#[derive(Clone)]
pub struct MockExecution {
    pub submitted: Arc<Mutex<Vec<TradeIntent>>>,
    pub failures: Arc<Mutex<VecDeque<RevtraderError>>>,
}

impl MockExecution {
    pub fn new() -> Self {
        Self {
            submitted: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn failing_with(self, error: RevtraderError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    pub fn submitted(&self) -> Vec<TradeIntent> {
        self.submitted.lock().unwrap().clone()
    }
}

impl ExecutionPort for MockExecution {
    fn execute(&mut self, intent: &TradeIntent) -> Result<Fill, RevtraderError> {
        self.submitted.lock().unwrap().push(intent.clone());
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Fill {
            client_order_id: intent.order.client_order_id.clone(),
            side: intent.order.side,
            quantity: intent.order.quantity,
            price: intent.reference_price,
            timestamp: intent.timestamp,
        })
    }
}
