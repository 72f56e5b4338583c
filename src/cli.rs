//! Command-line front end.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestResult, run_backtest};
use crate::domain::config_validation::{
    load_backtest_config, load_strategy_config, resolve_symbols, validate_backtest_config,
    validate_execution_config, validate_live_config, validate_strategy_config,
};
use crate::domain::error::RevtraderError;
use crate::domain::metrics::Metrics;
use crate::domain::strategy::StrategyConfig;
use crate::ports::bar_source::{BarRequest, BarSource};
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "revtrader", about = "Mean-reversion trading bot", version)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay historical bars through the strategy
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols, overriding the config file
        #[arg(long)]
        symbols: Option<String>,
        /// Read <SYMBOL>.csv files from this directory instead of the REST API
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Trade one symbol from the live bar stream
    #[cfg(feature = "alpaca")]
    Live {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Check a configuration file without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show account balances and open orders
    #[cfg(feature = "alpaca")]
    Account {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Backtest {
            config,
            symbols,
            data_dir,
        } => run_backtest_command(&config, symbols.as_deref(), data_dir.as_deref()),
        #[cfg(feature = "alpaca")]
        Command::Live { config, symbol } => live_command::run(&config, symbol.as_deref()),
        Command::Validate { config } => run_validate(&config),
        #[cfg(feature = "alpaca")]
        Command::Account { config } => live_command::account(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

/// Logs go to stderr so that reports on stdout stay clean.
pub fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},hyper=warn,hyper_util=warn,reqwest=warn,tungstenite=warn"
        ))
    });
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RevtraderError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

fn run_backtest_command(
    config_path: &Path,
    symbols_override: Option<&str>,
    data_dir_override: Option<&Path>,
) -> Result<(), RevtraderError> {
    let config = load_config(config_path)?;
    let strategy = load_strategy_config(&config)?;
    let backtest = load_backtest_config(&config)?;
    let symbols = resolve_symbols(symbols_override, &config)?;

    let data_dir = data_dir_override
        .map(Path::to_path_buf)
        .or_else(|| config.get_string("backtest", "data_dir").map(PathBuf::from));

    let source: Box<dyn BarSource> = match data_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "reading bars from CSV files");
            Box::new(CsvAdapter::new(dir))
        }
        None => rest_bar_source(&config)?,
    };

    let results = run_backtest_pipeline(source.as_ref(), &symbols, &strategy, &backtest)?;
    for result in &results {
        print!("{}", format_backtest_report(result, &Metrics::compute(result)));
    }
    Ok(())
}

#[cfg(feature = "alpaca")]
fn rest_bar_source(config: &dyn ConfigPort) -> Result<Box<dyn BarSource>, RevtraderError> {
    use crate::adapters::alpaca::rest::AlpacaRest;
    use crate::adapters::alpaca::{AlpacaCredentials, AlpacaEndpoints};
    use crate::domain::config_validation::load_execution_settings;

    let credentials = AlpacaCredentials::from_config(config)?;
    let rest = AlpacaRest::new(
        &credentials,
        AlpacaEndpoints::from_config(config),
        load_execution_settings(config)?,
    )?;
    Ok(Box::new(rest))
}

#[cfg(not(feature = "alpaca"))]
fn rest_bar_source(_config: &dyn ConfigPort) -> Result<Box<dyn BarSource>, RevtraderError> {
    Err(RevtraderError::ConfigMissing {
        section: "backtest".to_string(),
        key: "data_dir".to_string(),
    })
}

/// Runs one independent backtest per symbol.
///
/// Symbols whose data cannot be fetched or is too short are skipped with a
/// warning; the last such error is returned only if every symbol failed.
pub fn run_backtest_pipeline(
    source: &dyn BarSource,
    symbols: &[String],
    strategy: &StrategyConfig,
    backtest: &BacktestConfig,
) -> Result<Vec<BacktestResult>, RevtraderError> {
    let mut results = Vec::new();
    let mut last_error = None;

    for symbol in symbols {
        let request = BarRequest {
            symbol: symbol.clone(),
            start: backtest.start,
            end: backtest.end,
            limit: backtest.limit,
            timeframe: backtest.timeframe.clone(),
        };

        let outcome = source
            .fetch_bars(&request)
            .and_then(|bars| run_backtest(symbol, &bars, strategy, backtest.initial_cash));

        match outcome {
            Ok(result) => results.push(result),
            Err(e @ RevtraderError::Io(_)) => return Err(e),
            Err(e) => {
                warn!(%symbol, error = %e, "skipping symbol");
                last_error = Some(e);
            }
        }
    }

    match (results.is_empty(), last_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(results),
    }
}

pub fn format_backtest_report(result: &BacktestResult, metrics: &Metrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", result.symbol);
    let _ = writeln!(
        out,
        "bars: {} processed, {} skipped",
        result.bars_processed, result.bars_skipped
    );
    for trade in &result.trades {
        let _ = writeln!(
            out,
            "  {} {} x{} {:.2} -> {:.2} [{}] pnl {:.2}",
            trade.exit_time.format("%Y-%m-%d %H:%M"),
            trade.side,
            trade.quantity,
            trade.entry_price,
            trade.exit_price,
            trade.exit_reason,
            trade.pnl
        );
    }
    let _ = writeln!(out, "open position: {}", result.open_position);
    let _ = writeln!(out, "final portfolio value: {:.2}", result.final_value);
    let _ = writeln!(out, "total return: {:.2}%", metrics.total_return * 100.0);
    let _ = writeln!(out, "max drawdown: {:.2}%", metrics.max_drawdown * 100.0);
    let _ = writeln!(
        out,
        "trades: {} ({} won, {} lost, {} stop-loss, {} take-profit)",
        result.trades.len(),
        metrics.trades_won,
        metrics.trades_lost,
        metrics.stop_loss_exits,
        metrics.take_profit_exits
    );
    let _ = writeln!(out, "win rate: {:.1}%", metrics.win_rate * 100.0);
    let _ = writeln!(out, "profit factor: {:.2}", metrics.profit_factor);
    out
}

fn run_validate(config_path: &Path) -> Result<(), RevtraderError> {
    let config = load_config(config_path)?;

    validate_strategy_config(&config)?;
    validate_execution_config(&config)?;
    if config.get_string("backtest", "start").is_some() {
        validate_backtest_config(&config)?;
    }
    if config.get_string("live", "symbol").is_some() {
        validate_live_config(&config)?;
    }

    println!("{}: configuration is valid", config_path.display());
    Ok(())
}

#[cfg(feature = "alpaca")]
mod live_command {
    use std::path::Path;

    use tracing::info;

    use super::load_config;
    use crate::adapters::alpaca::rest::AlpacaRest;
    use crate::adapters::alpaca::stream::AlpacaBarStream;
    use crate::adapters::alpaca::{AlpacaCredentials, AlpacaEndpoints};
    use crate::domain::config_validation::{
        load_execution_settings, load_live_settings, load_strategy_config,
    };
    use crate::domain::error::RevtraderError;
    use crate::domain::session::TradingSession;
    use crate::live::{LiveSummary, OrderDispatcher, run_live};

    pub fn run(config_path: &Path, symbol: Option<&str>) -> Result<(), RevtraderError> {
        let config = load_config(config_path)?;
        let strategy = load_strategy_config(&config)?;
        let execution = load_execution_settings(&config)?;
        let live = load_live_settings(&config, symbol)?;
        let credentials = AlpacaCredentials::from_config(&config)?;
        let endpoints = AlpacaEndpoints::from_config(&config);

        let time_in_force = execution.time_in_force;
        let rest = AlpacaRest::new(&credentials, endpoints.clone(), execution)?
            .with_fill_timeout(live.fill_timeout);
        let dispatcher = OrderDispatcher::spawn(rest)?;

        let mut feed = AlpacaBarStream::new(endpoints.stream_url, credentials, live.symbol.clone());
        let mut session = TradingSession::with_time_in_force(live.symbol.clone(), strategy, time_in_force);

        info!(symbol = %live.symbol, "starting live session");
        let summary = run_live(&mut feed, &dispatcher, &mut session, &live)?;
        print!("{}", format_live_summary(&summary));
        Ok(())
    }

    pub fn account(config_path: &Path) -> Result<(), RevtraderError> {
        let config = load_config(config_path)?;
        let credentials = AlpacaCredentials::from_config(&config)?;
        let rest = AlpacaRest::new(
            &credentials,
            AlpacaEndpoints::from_config(&config),
            load_execution_settings(&config)?,
        )?;

        let account = rest.account()?;
        println!("account {} ({})", account.id, account.status);
        println!("  cash:         {}", account.cash);
        println!("  equity:       {}", account.equity);
        println!("  buying power: {}", account.buying_power);

        let orders = rest.open_orders()?;
        println!("open orders: {}", orders.len());
        for order in orders {
            println!(
                "  {} {} {} x{} [{}]",
                order.client_order_id,
                order.side,
                order.symbol,
                order.qty.as_deref().unwrap_or("?"),
                order.status
            );
        }
        Ok(())
    }

    pub fn format_live_summary(summary: &LiveSummary) -> String {
        let pnl: f64 = summary.trades.iter().map(|t| t.pnl).sum();
        format!(
            "== {} live ==\nbars: {} seen, {} skipped\norders: {} filled, {} rejected, {} failed\nreconnects: {}\nclosed trades: {} (pnl {:.2})\nposition: {}\n",
            summary.symbol,
            summary.bars_seen,
            summary.bars_skipped,
            summary.fills,
            summary.rejections,
            summary.failed_dispatches,
            summary.reconnects,
            summary.trades.len(),
            pnl,
            summary.final_position
        )
    }
}
