//! tradesim CLI — replay bar files through the simulated broker.
//!
//! Commands:
//! - `run` — replay a CSV of bars through a configured `SimBroker` with a
//!   buy-and-hold strategy and report the account, the position and the run
//! - `check` — load a config and print it fully resolved, defaults included

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tradesim_core::broker::OrderUpdate;
use tradesim_core::config::SimulationConfig;
use tradesim_core::domain::{AccountInfo, BarPeriod, BarType, Event, Execution, Order, OrderSide};
use tradesim_core::engine::{EngineError, RunSummary, Strategy, StrategyContext, TradingEngine};
use tradesim_core::feed::{AggregationPolicy, BarAggregatorFeed, CsvBarFeed, EventFeedManager};

#[derive(Parser)]
#[command(name = "tradesim", about = "tradesim — event-driven trading simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a CSV of bars with a buy-and-hold strategy.
    Run {
        /// Path to a TOML simulation config.
        #[arg(long)]
        config: PathBuf,

        /// CSV with start_dt,end_dt,open,high,low,close,volume rows.
        #[arg(long)]
        bars: PathBuf,

        /// Symbol the bars belong to; must be a configured instrument.
        #[arg(long)]
        symbol: String,

        /// Quantity bought on the first bar.
        #[arg(long, default_value = "1")]
        quantity: Decimal,

        /// Period of the input bars, in minutes.
        #[arg(long, default_value_t = 1)]
        bar_minutes: u32,

        /// Trade on bars aggregated to this many minutes instead of the raw bars.
        #[arg(long)]
        aggregate_minutes: Option<u32>,

        /// Sort the CSV rows by time before replaying.
        #[arg(long, default_value_t = false)]
        sort: bool,

        /// Print the report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Load a config and print it with every default filled in.
    Check {
        /// Path to a TOML simulation config.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, bars, symbol, quantity, bar_minutes, aggregate_minutes, sort, json } => {
            let options = RunOptions { symbol, quantity, bar_minutes, aggregate_minutes, sort };
            let report = run_replay(&config, &bars, &options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Commands::Check { config } => {
            let config = load_config(&config)?;
            config.build_broker().context("config does not build a broker")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

// ── Buy and hold ─────────────────────────────────────────────────────

/// Buys once on the first bar of its feed and holds; remembers the last close.
struct BuyAndHold {
    broker: String,
    symbol: String,
    feed: String,
    quantity: Decimal,
    bought: bool,
    last_close: Rc<Cell<Option<Decimal>>>,
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn on_event(&mut self, ctx: &mut StrategyContext<'_>, feed: &str, event: &Event) -> Result<(), EngineError> {
        let Some(bar) = event.as_bar().map(|b| &b.bar).filter(|bar| bar.symbol() == self.symbol) else {
            return Ok(());
        };
        self.last_close.set(Some(bar.close()));
        if self.bought || feed != self.feed {
            return Ok(());
        }
        let order = Order::market(self.symbol.clone(), OrderSide::Buy, self.quantity)
            .map_err(|e| EngineError::Strategy(e.to_string()))?;
        let id = ctx.submit_order(&self.broker, order)?;
        info!(order_id = %id, symbol = %self.symbol, quantity = %self.quantity, "entry submitted");
        self.bought = true;
        Ok(())
    }

    fn on_execution(&mut self, _ctx: &mut StrategyContext<'_>, execution: &Execution) -> Result<(), EngineError> {
        info!(
            symbol = %execution.symbol(),
            quantity = %execution.quantity(),
            price = %execution.price(),
            at = %execution.timestamp(),
            "filled"
        );
        Ok(())
    }

    fn on_order_updated(&mut self, _ctx: &mut StrategyContext<'_>, update: &OrderUpdate) -> Result<(), EngineError> {
        if let Some(reason) = update.reason.as_deref().filter(|r| !r.is_empty()) {
            info!(order_id = %update.order_id, to = ?update.to, %reason, "order updated");
        }
        Ok(())
    }
}

// ── Replay ───────────────────────────────────────────────────────────

struct RunOptions {
    symbol: String,
    quantity: Decimal,
    bar_minutes: u32,
    aggregate_minutes: Option<u32>,
    sort: bool,
}

#[derive(Debug, Serialize)]
struct RunReport {
    symbol: String,
    run: RunSummary,
    account: AccountInfo,
    executions: usize,
    position: Option<PositionReport>,
}

/// Open position marked to the last close seen.
#[derive(Debug, Serialize)]
struct PositionReport {
    quantity: Decimal,
    average_price: Decimal,
    realized_pnl: Decimal,
    mark: Option<Decimal>,
    unrealized_pnl: Option<Decimal>,
}

fn load_config(path: &Path) -> Result<SimulationConfig> {
    SimulationConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn run_replay(config_path: &Path, bars_path: &Path, options: &RunOptions) -> Result<RunReport> {
    let config = load_config(config_path)?;
    if !config.instruments.iter().any(|i| i.symbol == options.symbol) {
        bail!("symbol '{}' is not a configured instrument", options.symbol);
    }
    if options.quantity <= Decimal::ZERO {
        bail!("--quantity must be positive, got {}", options.quantity);
    }

    let period = BarPeriod::minutes(options.bar_minutes).context("invalid --bar-minutes")?;
    let bar_type = BarType::new(options.symbol.clone(), period);
    let mut source = CsvBarFeed::from_path(bars_path, bar_type.clone(), options.sort)
        .with_context(|| format!("failed to open bars {}", bars_path.display()))?;

    let mut feeds = EventFeedManager::new();
    let trade_feed = match options.aggregate_minutes {
        Some(minutes) => {
            let output = BarPeriod::minutes(minutes).context("invalid --aggregate-minutes")?;
            let aggregated = BarAggregatorFeed::new(&mut source, bar_type, output, AggregationPolicy::default())
                .context("cannot aggregate these bars")?;
            let name = format!("bars_{minutes}m");
            feeds.add_feed("bars", Box::new(source))?;
            feeds.add_feed(name.clone(), Box::new(aggregated))?;
            name
        }
        None => {
            feeds.add_feed("bars", Box::new(source))?;
            "bars".to_string()
        }
    };

    let broker = config.build_broker().context("config does not build a broker")?;
    let last_close = Rc::new(Cell::new(None));
    let strategy = BuyAndHold {
        broker: config.broker_name.clone(),
        symbol: options.symbol.clone(),
        feed: trade_feed,
        quantity: options.quantity,
        bought: false,
        last_close: Rc::clone(&last_close),
    };

    let mut engine = TradingEngine::default();
    engine.add_broker(Box::new(broker))?;
    engine.add_strategy(Box::new(strategy), feeds);
    let run = engine.start().context("replay failed")?;
    info!(events = run.events_dispatched, "replay finished");

    let Some(broker) = engine.broker(&config.broker_name) else {
        bail!("broker '{}' disappeared after the run", config.broker_name);
    };
    let mark = last_close.get();
    let contract_size = broker.instrument(&options.symbol).map_or(Decimal::ONE, |i| i.contract_size());
    let position = broker.get_position(&options.symbol).map(|p| PositionReport {
        quantity: p.quantity(),
        average_price: p.average_price(),
        realized_pnl: p.realized_pnl(),
        mark,
        unrealized_pnl: mark.map(|m| p.unrealized_pnl(m, contract_size)),
    });

    Ok(RunReport {
        symbol: options.symbol.clone(),
        run,
        account: broker.get_account_info(),
        executions: broker.executions().len(),
        position,
    })
}

fn print_report(report: &RunReport) {
    println!();
    println!("=== Replay Result ===");
    println!("Symbol:          {}", report.symbol);
    println!("Events:          {}", report.run.events_dispatched);
    println!("Stale skipped:   {}", report.run.stale_events_skipped);
    println!("Notifications:   {}", report.run.notifications_delivered);
    if let Some(cursor) = report.run.final_cursor {
        println!("Last event:      {cursor}");
    }
    println!("Executions:      {}", report.executions);
    println!();
    println!("--- Account ---");
    for (code, money) in &report.account.available {
        println!("Available {code}:   {money}");
    }
    for (symbol, entry) in &report.account.margins {
        println!("Margin {symbol}:    initial {} maintenance {}", entry.initial, entry.maintenance);
    }
    for (code, money) in &report.account.total_fees {
        println!("Fees {code}:        {money} ({} charges)", report.account.fee_count);
    }
    println!();
    println!("--- Position ---");
    match &report.position {
        Some(p) => {
            println!("Quantity:        {}", p.quantity);
            println!("Average price:   {}", p.average_price);
            println!("Realized P&L:    {}", p.realized_pnl);
            if let (Some(mark), Some(pnl)) = (p.mark, p.unrealized_pnl) {
                println!("Mark:            {mark}");
                println!("Unrealized P&L:  {pnl}");
            }
        }
        None => println!("Flat"),
    }
    println!();
}
