//! Daily Simulation Runner CLI
//!
//! Runs a daily prediction-market backtest over recorded or synthetic market
//! data and exports the results.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sim_run -- \
//!   --config sim.toml \
//!   --data market_days.json \
//!   --output results.json \
//!   --store results.db --name baseline
//!
//! # Self-contained demo on a generated market:
//! cargo run --bin sim_run -- --synthetic --start 2020-10-01 --end 2020-11-09
//! ```
//!
//! # Exit Codes
//!
//! - 0: run completed
//! - 2: configuration, input, or runtime error

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use pibot_backtest::sim::{
    generate_synthetic, DailySim, MarketDataSource, RecordedData, ResultStore, SimConfig,
    SimResult, SyntheticConfig,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Daily prediction-market backtest runner.
#[derive(Parser, Debug)]
#[command(name = "sim_run")]
#[command(about = "Run a daily prediction-market backtest")]
struct Cli {
    /// TOML simulation config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recorded market data (JSON array of day records)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Generate a synthetic market instead of reading recorded data
    #[arg(long)]
    synthetic: bool,

    /// RNG seed for --synthetic
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of contracts for --synthetic
    #[arg(long, default_value = "20")]
    synthetic_contracts: usize,

    /// Starting capital (overrides config)
    #[arg(long)]
    capital: Option<f64>,

    /// First simulated day (overrides config)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last simulated day, inclusive (overrides config)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Write the full result as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Persist the run into a SQLite result store
    #[arg(long)]
    store: Option<PathBuf>,

    /// Run name used in the result store
    #[arg(long, default_value = "sim")]
    name: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::new("info")
        }
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    tracing::info!(
        start = %config.start_date,
        end = %config.end_date,
        capital = config.capital,
        "starting simulation"
    );

    let result = if cli.synthetic {
        let synth = SyntheticConfig::new(
            cli.synthetic_contracts,
            config.start_date,
            (config.end_date - config.start_date).num_days() as u32 + 1,
            cli.seed,
        );
        run_sim(&config, generate_synthetic(&synth))
    } else {
        let path = cli
            .data
            .as_ref()
            .context("either --data or --synthetic is required")?;
        run_sim(&config, RecordedData::load(path)?)
    }?;

    print_summary(&result);

    if let Some(path) = &cli.output {
        result.write_json(path)?;
        tracing::info!(path = %path.display(), "result written");
    }

    if let Some(path) = &cli.store {
        let mut store = ResultStore::new(path)
            .with_context(|| format!("failed to open result store {}", path.display()))?;
        let run_id = store.save_run(&cli.name, &result)?;
        tracing::info!(run_id, "run persisted to store");
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => {
            let (Some(start), Some(end)) = (cli.start, cli.end) else {
                bail!("--start and --end are required when no --config is given");
            };
            SimConfig::new(cli.capital.unwrap_or(10_000.0), start, end)
        }
    };

    if let Some(capital) = cli.capital {
        config.capital = capital;
    }
    if let Some(start) = cli.start {
        config.start_date = start;
    }
    if let Some(end) = cli.end {
        config.end_date = end;
    }
    config.validate()?;
    Ok(config)
}

fn run_sim(config: &SimConfig, data: impl MarketDataSource) -> Result<SimResult> {
    let model = config.model.build();
    let sim = DailySim::new(config.capital, model, data);
    sim.run(config.start_date, config.end_date)
        .context("simulation aborted")
}

fn print_summary(result: &SimResult) {
    let s = &result.final_summary;
    println!();
    println!("=== Simulation Summary ===");
    println!("model:            {}", result.model);
    println!(
        "period:           {} .. {} ({} days, {} skipped)",
        result.start_date,
        result.end_date,
        result.days.len(),
        result.days_skipped
    );
    println!("initial capital:  {:>12.2}", result.initial_capital);
    println!("final capital:    {:>12.2}", s.capital);
    println!("position value:   {:>12.2}", s.pos_value);
    println!("final value:      {:>12.2}", s.value);
    println!("executed qty:     {:>12.2}", s.exe_qty);
    println!("executed value:   {:>12.2}", s.exe_value);
    println!("realized pnl:     {:>12.2}", s.realized_pnl);
    println!("unrealized pnl:   {:>12.2}", s.unrealized_pnl);
    println!("fees:             {:>12.2}", s.fees);
    println!("fills:            {:>12}", result.fills.len());
}
