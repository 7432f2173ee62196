//! Daily Simulation Runner
//!
//! Drives one book through a date range, one mutation per simulated day:
//!
//! ```text
//! snapshot -> update universe (forced liquidations first) -> model targets
//!          -> apply position change -> mark to trade prices
//!          -> apply resolutions -> record the day
//! ```
//!
//! Days with no usable snapshot are skipped and counted. The loop is
//! single-threaded and deterministic; parallel sweeps construct one runner
//! per worker, never share one.

use crate::sim::book::{Book, BookSummary, ContractSummary};
use crate::sim::error::SimError;
use crate::sim::fill::{Fill, FillLog};
use crate::sim::model::{FixedWeightModel, HoldModel, MarketDataSource, PositionModel};
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_capital() -> f64 {
    10_000.0
}

/// Simulation configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_capital")]
    pub capital: f64,
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
    #[serde(default)]
    pub model: ModelConfig,
}

impl SimConfig {
    pub fn new(capital: f64, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            capital,
            start_date,
            end_date,
            model: ModelConfig::default(),
        }
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.start_date <= self.end_date,
            "start_date {} is after end_date {}",
            self.start_date,
            self.end_date
        );
        anyhow::ensure!(self.capital > 0.0, "capital must be positive");
        Ok(())
    }
}

/// Which position model to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    Hold,
    FixedWeight {
        #[serde(default = "default_max_weight")]
        max_weight: f64,
        #[serde(default = "default_max_price")]
        max_price: f64,
    },
}

fn default_max_weight() -> f64 {
    0.5
}

fn default_max_price() -> f64 {
    0.95
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::FixedWeight {
            max_weight: default_max_weight(),
            max_price: default_max_price(),
        }
    }
}

impl ModelConfig {
    pub fn build(&self) -> Box<dyn PositionModel> {
        match *self {
            ModelConfig::Hold => Box::new(HoldModel),
            ModelConfig::FixedWeight {
                max_weight,
                max_price,
            } => Box::new(FixedWeightModel {
                max_weight,
                max_price,
            }),
        }
    }
}

/// One simulated day's outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub book: BookSummary,
    pub contracts: Vec<ContractSummary>,
    pub fills: Vec<Fill>,
}

/// Everything a finished run exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimResult {
    pub model: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub days: Vec<DayRecord>,
    pub days_skipped: u32,
    pub final_summary: BookSummary,
    pub final_contracts: Vec<ContractSummary>,
    pub fills: Vec<Fill>,
}

impl SimResult {
    pub fn final_value(&self) -> f64 {
        self.final_summary.value
    }

    /// Write the full result as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// The daily driver: owns the book, the fill log, a model, and a source.
pub struct DailySim<M: PositionModel, D: MarketDataSource> {
    book: Book,
    model: M,
    data: D,
    fill_log: FillLog,
}

impl<M: PositionModel, D: MarketDataSource> DailySim<M, D> {
    pub fn new(capital: f64, model: M, data: D) -> Self {
        Self {
            book: Book::new(capital),
            model,
            data,
            fill_log: FillLog::new(),
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn fill_log(&self) -> &FillLog {
        &self.fill_log
    }

    /// Run over `[start, end]` inclusive and consume the driver.
    pub fn run(mut self, start: NaiveDate, end: NaiveDate) -> Result<SimResult, SimError> {
        let initial_capital = self.book.capital();
        let mut days = Vec::new();
        let mut skipped = 0u32;

        let mut date = start;
        while date <= end {
            match self.step(date)? {
                Some(record) => days.push(record),
                None => skipped += 1,
            }
            let Some(next) = date.succ_opt() else { break };
            date = next;
        }

        tracing::info!(
            days = days.len(),
            skipped,
            value = self.book.value(),
            "simulation complete"
        );

        Ok(SimResult {
            model: self.model.name().to_string(),
            start_date: start,
            end_date: end,
            initial_capital,
            days,
            days_skipped: skipped,
            final_summary: self.book.summary(),
            final_contracts: self.book.contract_summaries(),
            fills: self.fill_log.fills().to_vec(),
        })
    }

    /// One simulated day. Returns `None` for skipped bad-data days.
    fn step(&mut self, date: NaiveDate) -> Result<Option<DayRecord>, SimError> {
        let Some(snapshot) = self.data.snapshot(date) else {
            tracing::warn!(%date, "bad market data; skipping day");
            return Ok(None);
        };

        let today_ids = self.data.universe(date);
        let forced = self.book.update_universe(&today_ids, &snapshot)?;
        if !forced.is_empty() {
            tracing::info!(%date, count = forced.len(), "forced liquidations");
        }

        let view = snapshot.reindex(self.book.universe());
        let targets = self.model.target_positions(date, &self.book, &view);
        let fills = self.book.apply_position_change(&targets, &snapshot)?;

        self.book.set_mark_price(&snapshot);

        let resolutions = self.data.resolutions(date);
        if !resolutions.is_empty() {
            self.book.apply_resolutions(&resolutions)?;
        }

        let day_fills: Vec<Fill> = forced
            .into_iter()
            .chain(fills)
            .map(|fill| fill.dated(date))
            .collect();
        for fill in &day_fills {
            self.fill_log.record(fill.clone());
        }

        tracing::debug!(
            %date,
            capital = self.book.capital(),
            value = self.book.value(),
            fills = day_fills.len(),
            "day complete"
        );

        Ok(Some(DayRecord {
            date,
            book: self.book.summary(),
            contracts: self.book.contract_summaries(),
            fills: day_fills,
        }))
    }
}
