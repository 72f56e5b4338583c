//! End-to-end tests over the public API.
//!
//! - Backtests over synthetic close series with known outcomes
//! - Multi-symbol pipeline with a mock bar source
//! - Session driven by a mock execution port
//! - Live loop with a scripted feed and the order dispatcher thread

mod common;

use common::*;
use revtrader::cli::run_backtest_pipeline;
use revtrader::domain::backtest::{BacktestConfig, run_backtest};
use revtrader::domain::config_validation::LiveSettings;
use revtrader::domain::error::RevtraderError;
use revtrader::domain::metrics::Metrics;
use revtrader::domain::order::{ExitReason, IntentKind, OrderSide};
use revtrader::domain::position::PositionState;
use revtrader::domain::session::TradingSession;
use revtrader::domain::state_machine::{Decision, Transition};
use revtrader::live::{OrderDispatcher, run_live};
use revtrader::ports::execution_port::ExecutionPort;
use rust_decimal_macros::dec;
use std::time::Duration;

mod backtest_scenarios {
    use super::*;

    #[test]
    fn quiet_market_never_trades() {
        let bars = make_bars(&quiet_closes());
        // 29 bars is one short of warmup
        let err = run_backtest("AAPL", &bars, &strategy(100), dec!(100000)).unwrap_err();
        assert!(matches!(err, RevtraderError::InsufficientData { bars: 29, .. }));

        let bars = make_bars(&closes_then(&[102.0, 101.0, 99.0]));
        let result = run_backtest("AAPL", &bars, &strategy(100), dec!(100000)).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.final_value, dec!(100000));
        assert_eq!(result.open_position, PositionState::Flat);
    }

    #[test]
    fn long_entry_exits_at_take_profit() {
        let bars = make_bars(&closes_then(&[95.0, 101.0]));
        let result = run_backtest("AAPL", &bars, &strategy(100), dec!(100000)).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.side, PositionState::Long);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.entry_price, 95.0);
        assert_eq!(trade.exit_price, 101.0);
        assert!((trade.pnl - 600.0).abs() < 1e-9);

        assert_eq!(result.ledger.cash, dec!(100600));
        assert_eq!(result.final_value, dec!(100600));
        assert_eq!(result.open_position, PositionState::Flat);

        let metrics = Metrics::compute(&result);
        assert_eq!(metrics.trades_won, 1);
        assert_eq!(metrics.take_profit_exits, 1);
        assert!((metrics.total_return - 0.006).abs() < 1e-9);
    }

    #[test]
    fn long_entry_exits_at_stop_loss() {
        let bars = make_bars(&closes_then(&[95.0, 93.0]));
        let result = run_backtest("AAPL", &bars, &strategy(100), dec!(100000)).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(result.ledger.cash, dec!(99800));

        let metrics = Metrics::compute(&result);
        assert_eq!(metrics.trades_lost, 1);
        assert_eq!(metrics.stop_loss_exits, 1);
        assert!(metrics.max_drawdown > 0.0);
    }

    #[test]
    fn spike_above_upper_band_opens_short() {
        let bars = make_bars(&closes_then(&[103.0]));
        let result = run_backtest("AAPL", &bars, &strategy(100), dec!(100000)).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.open_position, PositionState::Short);
        assert_eq!(result.ledger.shares, -100);
        assert_eq!(result.ledger.cash, dec!(110300));
        // marked at the entry close, so no gain or loss yet
        assert_eq!(result.final_value, dec!(100000));
    }

    #[test]
    fn open_position_is_reported_at_end() {
        let bars = make_bars(&closes_then(&[95.0]));
        let result = run_backtest("AAPL", &bars, &strategy(100), dec!(100000)).unwrap();
        assert_eq!(result.open_position, PositionState::Long);
        assert_eq!(result.final_value, dec!(100000));
        assert_eq!(result.bars_processed, 30);
    }

    #[test]
    fn bad_bars_are_skipped_not_fatal() {
        let mut bars = make_bars(&closes_then(&[95.0, 101.0]));
        bars.insert(10, Bar::new(ts(100), f64::NAN));
        bars.insert(20, Bar::new(ts(101), 0.0));
        let result = run_backtest("AAPL", &bars, &strategy(100), dec!(100000)).unwrap();
        assert_eq!(result.bars_skipped, 2);
        assert_eq!(result.trades.len(), 1);
    }
}

mod pipeline {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn backtest_config() -> BacktestConfig {
        BacktestConfig {
            initial_cash: dec!(100000),
            start: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2021, 12, 31, 0, 0, 0).unwrap(),
            limit: 1000,
            timeframe: "1Min".to_string(),
        }
    }

    #[test]
    fn each_symbol_runs_independently() {
        let source = MockBarSource::new()
            .with_bars("AAPL", make_bars(&closes_then(&[95.0, 101.0])))
            .with_bars("MSFT", make_bars(&closes_then(&[103.0])));
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];

        let results =
            run_backtest_pipeline(&source, &symbols, &strategy(100), &backtest_config()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].symbol, "AAPL");
        assert_eq!(results[0].trades.len(), 1);
        assert_eq!(results[1].symbol, "MSFT");
        assert_eq!(results[1].open_position, PositionState::Short);
    }

    #[test]
    fn failing_symbol_is_skipped() {
        let source = MockBarSource::new()
            .with_bars("AAPL", make_bars(&closes_then(&[95.0])))
            .with_error("MSFT", "HTTP 500");
        let symbols = vec!["MSFT".to_string(), "AAPL".to_string(), "TSLA".to_string()];

        let results =
            run_backtest_pipeline(&source, &symbols, &strategy(100), &backtest_config()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol, "AAPL");
    }

    #[test]
    fn all_symbols_failing_is_an_error() {
        let source = MockBarSource::new()
            .with_bars("AAPL", make_bars(&[100.0, 101.0]))
            .with_error("MSFT", "HTTP 500");
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];

        let err = run_backtest_pipeline(&source, &symbols, &strategy(100), &backtest_config())
            .unwrap_err();
        assert_eq!(err.exit_status(), 5);
    }
}

mod session_with_port {
    use super::*;

    fn feed_until_signal(session: &mut TradingSession, closes: &[f64]) -> Option<Decision> {
        for bar in make_bars(closes) {
            if let Ok(d @ Decision::Signal(_)) = session.on_bar(&bar) {
                return Some(d);
            }
        }
        None
    }

    #[test]
    fn intents_carry_order_details() {
        let mut session = TradingSession::new("AAPL", strategy(100));
        let Some(Decision::Signal(intent)) = feed_until_signal(&mut session, &closes_then(&[95.0]))
        else {
            panic!("expected an entry signal");
        };

        assert_eq!(intent.kind, IntentKind::OpenLong);
        assert_eq!(intent.order.side, OrderSide::Buy);
        assert_eq!(intent.order.quantity, 100);
        assert_eq!(intent.order.symbol, "AAPL");
        assert_eq!(intent.reference_price, 95.0);
        assert!(session.has_pending());

        let mut port = MockExecution::new();
        let transition = session.apply_execution(port.execute(&intent)).unwrap();
        assert!(matches!(
            transition,
            Transition::Opened {
                state: PositionState::Long,
                quantity: 100,
                ..
            }
        ));
        assert!(!session.has_pending());
        assert_eq!(port.submitted().len(), 1);
    }

    #[test]
    fn rejected_order_leaves_position_flat() {
        let mut session = TradingSession::new("AAPL", strategy(100));
        let Some(Decision::Signal(intent)) = feed_until_signal(&mut session, &closes_then(&[95.0]))
        else {
            panic!("expected an entry signal");
        };

        let mut port = MockExecution::new().failing_with(RevtraderError::ExecutionRejected {
            reason: "insufficient buying power".into(),
        });
        assert!(session.apply_execution(port.execute(&intent)).is_err());
        assert!(session.position().is_flat());
        assert!(!session.has_pending());
        assert_eq!(session.rejected_orders(), 1);
    }

    #[test]
    fn distinct_client_order_ids() {
        let mut session = TradingSession::new("AAPL", strategy(100));
        let mut port = MockExecution::new();
        for bar in make_bars(&closes_then(&[95.0, 101.0])) {
            if let Ok(Decision::Signal(intent)) = session.on_bar(&bar) {
                session.apply_execution(port.execute(&intent)).unwrap();
            }
        }
        let submitted = port.submitted();
        assert_eq!(submitted.len(), 2);
        assert_ne!(
            submitted[0].order.client_order_id,
            submitted[1].order.client_order_id
        );
        assert_eq!(submitted[1].kind, IntentKind::Close(ExitReason::TakeProfit));
        assert_eq!(submitted[1].order.side, OrderSide::Sell);
    }
}

mod live_loop {
    use super::*;

    fn settings() -> LiveSettings {
        LiveSettings {
            symbol: "AAPL".to_string(),
            reconnect_delay: Duration::ZERO,
            max_reconnects: 3,
            fill_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn entry_fill_is_applied_when_feed_ends() {
        let port = MockExecution::new();
        let dispatcher = OrderDispatcher::spawn(port.clone()).unwrap();
        let mut feed = MockFeed::from_closes(&closes_then(&[95.0]));
        let mut session = TradingSession::new("AAPL", strategy(100));

        let summary = run_live(&mut feed, &dispatcher, &mut session, &settings()).unwrap();

        assert_eq!(summary.bars_seen, 30);
        assert_eq!(summary.fills, 1);
        assert_eq!(summary.reconnects, 0);
        assert_eq!(summary.final_position, PositionState::Long);
        assert_eq!(port.submitted().len(), 1);
    }

    #[test]
    fn dropped_connection_is_reestablished() {
        let mut events: Vec<FeedEvent> = make_bars(&closes_then(&[95.0]))
            .into_iter()
            .map(FeedEvent::Bar)
            .collect();
        events.insert(12, FeedEvent::Drop);
        let mut feed = MockFeed::new(events);

        let dispatcher = OrderDispatcher::spawn(MockExecution::new()).unwrap();
        let mut session = TradingSession::new("AAPL", strategy(100));
        let summary = run_live(&mut feed, &dispatcher, &mut session, &settings()).unwrap();

        assert_eq!(summary.reconnects, 1);
        assert_eq!(feed.connects, 2);
        // history survives the reconnect, so the signal still fires on bar 30
        assert_eq!(summary.bars_seen, 30);
        assert_eq!(summary.final_position, PositionState::Long);
    }

    #[test]
    fn gives_up_after_max_reconnects() {
        let mut feed = MockFeed::from_closes(&quiet_closes());
        feed.failing_connects = 10;

        let dispatcher = OrderDispatcher::spawn(MockExecution::new()).unwrap();
        let mut session = TradingSession::new("AAPL", strategy(100));
        let err = run_live(&mut feed, &dispatcher, &mut session, &settings()).unwrap_err();
        assert!(matches!(err, RevtraderError::Transport { .. }));
    }

    #[test]
    fn rejected_entry_is_counted() {
        let port = MockExecution::new().failing_with(RevtraderError::ExecutionRejected {
            reason: "market closed".into(),
        });
        let dispatcher = OrderDispatcher::spawn(port).unwrap();
        let mut feed = MockFeed::from_closes(&closes_then(&[95.0]));
        let mut session = TradingSession::new("AAPL", strategy(100));

        let summary = run_live(&mut feed, &dispatcher, &mut session, &settings()).unwrap();
        assert_eq!(summary.fills, 0);
        assert_eq!(summary.rejections, 1);
        assert_eq!(summary.final_position, PositionState::Flat);
    }

    #[test]
    fn exhausted_retries_are_failed_dispatches() {
        let port = MockExecution::new().failing_with(RevtraderError::DispatchFailed {
            attempts: 3,
            reason: "HTTP 504".into(),
        });
        let dispatcher = OrderDispatcher::spawn(port).unwrap();
        let mut feed = MockFeed::from_closes(&closes_then(&[95.0]));
        let mut session = TradingSession::new("AAPL", strategy(100));

        let summary = run_live(&mut feed, &dispatcher, &mut session, &settings()).unwrap();
        assert_eq!(summary.failed_dispatches, 1);
        assert_eq!(summary.rejections, 0);
        assert_eq!(summary.final_position, PositionState::Flat);
    }

    #[test]
    fn unknown_order_state_stops_the_session() {
        let port = MockExecution::new().failing_with(RevtraderError::Unreconciled {
            client_order_id: "rev-AAPL-1".into(),
            reason: "HTTP 500: internal error".into(),
        });
        let dispatcher = OrderDispatcher::spawn(port.clone()).unwrap();
        let mut feed = MockFeed::from_closes(&closes_then(&[95.0, 94.0, 93.0]));
        let mut session = TradingSession::new("AAPL", strategy(100));

        let err = run_live(&mut feed, &dispatcher, &mut session, &settings()).unwrap_err();
        assert!(matches!(err, RevtraderError::Unreconciled { .. }));
        assert_eq!(err.exit_status(), 4);
        // no second order goes out once the first one is unaccounted for
        assert_eq!(port.submitted().len(), 1);
    }
}
