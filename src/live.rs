//! Live trading loop.
//!
//! Bars come from a [`LiveBarFeed`] on the calling thread. Orders are
//! executed on a separate worker owned by [`OrderDispatcher`] so a slow
//! brokerage call never blocks bar intake. At most one order is in flight:
//! the session refuses new decisions until the previous result is applied.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::config_validation::LiveSettings;
use crate::domain::error::RevtraderError;
use crate::domain::order::{Fill, TradeIntent};
use crate::domain::position::{ClosedTrade, PositionState};
use crate::domain::session::TradingSession;
use crate::domain::state_machine::{Decision, Transition};
use crate::ports::bar_source::LiveBarFeed;
use crate::ports::execution_port::ExecutionPort;

/// Outcome of one dispatched intent.
#[derive(Debug)]
pub struct DispatchResult {
    pub intent: TradeIntent,
    pub result: Result<Fill, RevtraderError>,
}

pub struct OrderDispatcher {
    requests: Option<Sender<TradeIntent>>,
    results: Receiver<DispatchResult>,
    worker: Option<JoinHandle<()>>,
}

impl OrderDispatcher {
    /// Moves `port` onto a worker thread that executes intents in order.
    pub fn spawn<E>(mut port: E) -> Result<Self, RevtraderError>
    where
        E: ExecutionPort + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<TradeIntent>();
        let (result_tx, result_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("order-dispatch".to_string())
            .spawn(move || {
                for intent in request_rx {
                    let result = port.execute(&intent);
                    if result_tx.send(DispatchResult { intent, result }).is_err() {
                        break;
                    }
                }
            })?;

        Ok(OrderDispatcher {
            requests: Some(request_tx),
            results: result_rx,
            worker: Some(worker),
        })
    }

    pub fn submit(&self, intent: TradeIntent) -> Result<(), RevtraderError> {
        let sender = self.requests.as_ref().ok_or_else(dispatcher_gone)?;
        sender.send(intent).map_err(|_| dispatcher_gone())
    }

    pub fn try_recv(&self) -> Option<DispatchResult> {
        match self.results.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<DispatchResult> {
        match self.results.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for OrderDispatcher {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("order dispatcher thread panicked");
            }
        }
    }
}

fn dispatcher_gone() -> RevtraderError {
    RevtraderError::Transport {
        reason: "order dispatcher has stopped".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSummary {
    pub symbol: String,
    pub bars_seen: usize,
    pub bars_skipped: usize,
    pub fills: usize,
    pub rejections: usize,
    pub failed_dispatches: usize,
    pub reconnects: usize,
    pub trades: Vec<ClosedTrade>,
    pub final_position: PositionState,
}

#[derive(Debug, Default)]
struct Counters {
    fills: usize,
    rejections: usize,
    failed_dispatches: usize,
    reconnects: usize,
}

/// Runs the live loop until the feed ends or cannot be reconnected.
pub fn run_live(
    feed: &mut dyn LiveBarFeed,
    dispatcher: &OrderDispatcher,
    session: &mut TradingSession,
    settings: &LiveSettings,
) -> Result<LiveSummary, RevtraderError> {
    let mut counters = Counters::default();

    if let Err(e) = feed.connect() {
        warn!(error = %e, "initial connect failed");
        reconnect(feed, settings, &mut counters)?;
    }

    loop {
        while let Some(outcome) = dispatcher.try_recv() {
            apply_outcome(session, outcome, &mut counters)?;
        }

        let bar = match feed.next_bar() {
            Ok(Some(bar)) => bar,
            Ok(None) => break,
            Err(e @ RevtraderError::Transport { .. }) => {
                warn!(error = %e, "bar feed dropped");
                reconnect(feed, settings, &mut counters)?;
                continue;
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "bad message from feed");
                continue;
            }
            Err(e) => return Err(e),
        };

        match session.on_bar(&bar) {
            Ok(Decision::Signal(intent)) => dispatcher.submit(intent)?,
            Ok(_) => {}
            Err(e) if e.is_recoverable() => {}
            Err(e) => return Err(e),
        }
    }

    if session.has_pending() {
        info!(timeout = ?settings.fill_timeout, "feed ended, waiting for outstanding order");
        match dispatcher.recv_timeout(settings.fill_timeout) {
            Some(outcome) => apply_outcome(session, outcome, &mut counters)?,
            None => warn!("no result for outstanding order; position may be out of date"),
        }
    }

    let summary = LiveSummary {
        symbol: session.symbol().to_string(),
        bars_seen: session.bars_seen(),
        bars_skipped: session.skipped_bars(),
        fills: counters.fills,
        rejections: counters.rejections,
        failed_dispatches: counters.failed_dispatches,
        reconnects: counters.reconnects,
        trades: session.trades().to_vec(),
        final_position: session.position().state,
    };
    info!(
        symbol = %summary.symbol,
        bars = summary.bars_seen,
        fills = summary.fills,
        trades = summary.trades.len(),
        "live session ended"
    );
    Ok(summary)
}

/// An order whose broker state cannot be established stops the session:
/// trading on would risk a second position.
fn apply_outcome(
    session: &mut TradingSession,
    outcome: DispatchResult,
    counters: &mut Counters,
) -> Result<(), RevtraderError> {
    let client_order_id = outcome.intent.order.client_order_id.clone();
    match session.apply_execution(outcome.result) {
        Ok(Transition::Opened { .. }) | Ok(Transition::Closed(_)) => counters.fills += 1,
        Err(e @ RevtraderError::DispatchFailed { .. }) => {
            counters.failed_dispatches += 1;
            error!(%client_order_id, error = %e, "order could not be dispatched");
        }
        Err(e @ RevtraderError::Unreconciled { .. }) => {
            error!(%client_order_id, error = %e, "stopping: check the account before restarting");
            return Err(e);
        }
        Err(_) => counters.rejections += 1,
    }
    Ok(())
}

/// Sleeps and reconnects until it works or `max_reconnects` consecutive
/// attempts have failed. Series and position are left as they were.
fn reconnect(
    feed: &mut dyn LiveBarFeed,
    settings: &LiveSettings,
    counters: &mut Counters,
) -> Result<(), RevtraderError> {
    let mut last_error = String::from("no attempts made");
    for attempt in 1..=settings.max_reconnects {
        thread::sleep(settings.reconnect_delay);
        match feed.connect() {
            Ok(()) => {
                counters.reconnects += 1;
                info!(attempt, "bar feed reconnected");
                return Ok(());
            }
            Err(e) => {
                warn!(attempt, error = %e, "reconnect failed");
                last_error = e.to_string();
            }
        }
    }
    Err(RevtraderError::Transport {
        reason: format!(
            "gave up after {} reconnect attempts: {last_error}",
            settings.max_reconnects
        ),
    })
}
