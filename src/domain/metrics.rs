//! Summary statistics for a finished backtest.

use rust_decimal::prelude::ToPrimitive;

use super::backtest::BacktestResult;
use super::ledger::EquityPoint;
use super::order::ExitReason;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    /// Longest run of bars spent below a prior equity peak.
    pub max_drawdown_bars: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub stop_loss_exits: usize,
    pub take_profit_exits: usize,
    /// Mean time in a trade, in minutes.
    pub avg_holding_minutes: f64,
}

impl Metrics {
    pub fn compute(result: &BacktestResult) -> Self {
        let initial = result.ledger.initial_cash.to_f64().unwrap_or(0.0);
        let final_value = result.final_value.to_f64().unwrap_or(initial);

        let total_return = if initial > 0.0 {
            (final_value - initial) / initial
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_bars) = compute_drawdown(&result.ledger.equity_curve);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut stop_loss_exits = 0usize;
        let mut take_profit_exits = 0usize;
        let mut held_minutes = 0i64;
        let mut timed_trades = 0usize;

        for trade in &result.trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }

            match trade.exit_reason {
                ExitReason::StopLoss => stop_loss_exits += 1,
                ExitReason::TakeProfit => take_profit_exits += 1,
            }

            if let Some(entry_time) = trade.entry_time {
                held_minutes += (trade.exit_time - entry_time).num_minutes();
                timed_trades += 1;
            }
        }

        let total_trades = result.trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };
        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };
        let avg_holding_minutes = if timed_trades > 0 {
            held_minutes as f64 / timed_trades as f64
        } else {
            0.0
        };

        Metrics {
            total_return,
            max_drawdown,
            max_drawdown_bars,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            stop_loss_exits,
            take_profit_exits,
            avg_holding_minutes,
        }
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut run = 0usize;
    let mut longest = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            run = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            run += 1;
            longest = longest.max(run);
        }
    }

    (max_dd, longest)
}
