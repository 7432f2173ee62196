//! Position Models and Market Data Sources
//!
//! The two seams the daily driver is parameterized over. Models and sources
//! are explicit trait objects constructed once and passed in by the caller;
//! there is no hidden global state, no wall-clock access, and anything
//! random is driven by a caller-provided seed.

use crate::sim::book::Book;
use crate::sim::market_data::{ContractId, PriceSnapshot, Qty, Quote, SnapshotView};
use anyhow::Context;
use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A daily position model.
///
/// Given the book state and the day's quotes (already reindexed to the
/// book's universe), emits one target per universe index; `None` means
/// "leave unchanged".
pub trait PositionModel {
    fn name(&self) -> &str {
        "unnamed"
    }

    fn target_positions(
        &mut self,
        day: NaiveDate,
        book: &Book,
        view: &SnapshotView,
    ) -> Vec<Option<Qty>>;
}

impl PositionModel for Box<dyn PositionModel> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn target_positions(
        &mut self,
        day: NaiveDate,
        book: &Book,
        view: &SnapshotView,
    ) -> Vec<Option<Qty>> {
        (**self).target_positions(day, book, view)
    }
}

/// Per-day inputs for the simulator.
pub trait MarketDataSource {
    fn name(&self) -> &str {
        "unknown"
    }

    /// Contracts listed and tradable on `day`.
    fn universe(&mut self, day: NaiveDate) -> Vec<ContractId>;

    /// Quotes for `day`. `None` flags the whole day as bad data; the driver
    /// skips it.
    fn snapshot(&mut self, day: NaiveDate) -> Option<PriceSnapshot>;

    /// Contracts settling on `day`, with settlement values. Absent entries
    /// are simply not yet resolved.
    fn resolutions(&mut self, day: NaiveDate) -> HashMap<ContractId, f64>;
}

// =============================================================================
// LIBRARY MODELS
// =============================================================================

/// Never trades. Useful as a baseline and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldModel;

impl PositionModel for HoldModel {
    fn name(&self) -> &str {
        "hold"
    }

    fn target_positions(
        &mut self,
        _day: NaiveDate,
        book: &Book,
        _view: &SnapshotView,
    ) -> Vec<Option<Qty>> {
        vec![None; book.universe().len()]
    }
}

/// Spends a fixed fraction of capital, split evenly across every active,
/// unresolved contract quoting at or below `max_price`, rounded to whole
/// contracts. Contracts outside the filter are left unchanged.
#[derive(Debug, Clone, Copy)]
pub struct FixedWeightModel {
    /// Fraction of current capital to deploy each day.
    pub max_weight: f64,
    /// Only buy contracts with ask at or below this price.
    pub max_price: f64,
}

impl Default for FixedWeightModel {
    fn default() -> Self {
        Self {
            max_weight: 0.5,
            max_price: 0.95,
        }
    }
}

impl PositionModel for FixedWeightModel {
    fn name(&self) -> &str {
        "fixed_weight"
    }

    fn target_positions(
        &mut self,
        _day: NaiveDate,
        book: &Book,
        view: &SnapshotView,
    ) -> Vec<Option<Qty>> {
        let universe = book.universe();
        let n = universe.len();

        let candidates: Vec<(usize, f64)> = (0..n)
            .filter(|&idx| universe.is_active(idx) && !book.is_resolved(idx))
            .filter_map(|idx| view.valid_two_sided(idx).map(|(_, ask)| (idx, ask)))
            .filter(|&(_, ask)| ask > 0.0 && ask <= self.max_price)
            .collect();

        let mut targets = vec![None; n];
        if candidates.is_empty() {
            return targets;
        }

        let budget = (book.capital() * self.max_weight).max(0.0) / candidates.len() as f64;
        for (idx, ask) in candidates {
            targets[idx] = Some((budget / ask).floor());
        }
        targets
    }
}

// =============================================================================
// RECORDED DATA
// =============================================================================

/// One day of recorded inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedDay {
    pub date: NaiveDate,
    /// Listed contracts; defaults to the quoted ids when empty.
    #[serde(default)]
    pub universe: Vec<ContractId>,
    #[serde(default)]
    pub quotes: HashMap<ContractId, Quote>,
    #[serde(default)]
    pub resolutions: HashMap<ContractId, f64>,
    /// Marks the whole day as unusable; the driver skips it.
    #[serde(default)]
    pub bad_data: bool,
}

/// Day-file-backed source, the replay side of the simulator.
#[derive(Debug, Clone, Default)]
pub struct RecordedData {
    days: HashMap<NaiveDate, RecordedDay>,
}

impl RecordedData {
    pub fn new(days: Vec<RecordedDay>) -> Self {
        Self {
            days: days.into_iter().map(|d| (d.date, d)).collect(),
        }
    }

    /// Load a JSON array of [`RecordedDay`] records.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read market data file {}", path.display()))?;
        let days: Vec<RecordedDay> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse market data file {}", path.display()))?;
        Ok(Self::new(days))
    }

    pub fn num_days(&self) -> usize {
        self.days.len()
    }
}

impl MarketDataSource for RecordedData {
    fn name(&self) -> &str {
        "recorded"
    }

    fn universe(&mut self, day: NaiveDate) -> Vec<ContractId> {
        match self.days.get(&day) {
            Some(rec) if !rec.universe.is_empty() => rec.universe.clone(),
            Some(rec) => {
                let mut ids: Vec<ContractId> = rec.quotes.keys().copied().collect();
                ids.sort_unstable();
                ids
            }
            None => Vec::new(),
        }
    }

    fn snapshot(&mut self, day: NaiveDate) -> Option<PriceSnapshot> {
        let rec = self.days.get(&day)?;
        if rec.bad_data {
            return None;
        }
        Some(PriceSnapshot {
            quotes: rec.quotes.clone(),
        })
    }

    fn resolutions(&mut self, day: NaiveDate) -> HashMap<ContractId, f64> {
        self.days
            .get(&day)
            .map(|rec| rec.resolutions.clone())
            .unwrap_or_default()
    }
}

// =============================================================================
// SYNTHETIC DATA
// =============================================================================

/// Parameters for the synthetic market generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub num_contracts: usize,
    pub start_date: NaiveDate,
    pub num_days: u32,
    pub seed: u64,
    /// Full bid/ask spread around the mid.
    pub spread: f64,
    /// Maximum absolute daily mid move.
    pub daily_vol: f64,
    /// Days a contract stays listed before it leaves the universe.
    pub lifetime_days: u32,
    /// A new wave of contracts lists every this many days.
    pub listing_every: u32,
}

impl SyntheticConfig {
    pub fn new(num_contracts: usize, start_date: NaiveDate, num_days: u32, seed: u64) -> Self {
        Self {
            num_contracts,
            start_date,
            num_days,
            seed,
            spread: 0.04,
            daily_vol: 0.05,
            lifetime_days: 15,
            listing_every: 5,
        }
    }
}

/// Generate a full synthetic market as recorded days: random-walk mids with a
/// fixed spread, staggered listings, and terminal resolution on each
/// contract's last listed day. Every seventh contract instead delists
/// without resolving, to exercise forced liquidation; it stays quoted one
/// extra day so the liquidation can price.
pub fn generate_synthetic(cfg: &SyntheticConfig) -> RecordedData {
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);

    struct Contract {
        cid: ContractId,
        list_day: u32,
        end_day: u32,
        resolves: bool,
        mid: f64,
    }

    let mut contracts: Vec<Contract> = (0..cfg.num_contracts)
        .map(|i| {
            let cid = 1000 + i as ContractId;
            let wave = (i as u32 / 4) * cfg.listing_every;
            let list_day = wave.min(cfg.num_days.saturating_sub(1));
            Contract {
                cid,
                list_day,
                end_day: (list_day + cfg.lifetime_days).min(cfg.num_days.saturating_sub(1)),
                resolves: i % 7 != 6,
                mid: rng.gen_range(0.15..0.85),
            }
        })
        .collect();

    let mut days = Vec::with_capacity(cfg.num_days as usize);
    for day_idx in 0..cfg.num_days {
        let date = cfg
            .start_date
            .checked_add_days(chrono::Days::new(day_idx as u64))
            .expect("synthetic date range out of bounds");
        let mut day = RecordedDay {
            date,
            ..Default::default()
        };

        for contract in contracts.iter_mut() {
            if day_idx < contract.list_day {
                continue;
            }
            // One extra quoted day after delisting, for forced liquidation.
            let quote_until = if contract.resolves {
                contract.end_day
            } else {
                contract.end_day + 1
            };
            if day_idx > quote_until {
                continue;
            }

            contract.mid =
                (contract.mid + rng.gen_range(-cfg.daily_vol..cfg.daily_vol)).clamp(0.02, 0.98);
            let half = cfg.spread / 2.0;
            let bid = (contract.mid - half).max(0.01);
            let ask = (contract.mid + half).min(0.99);
            day.quotes.insert(contract.cid, Quote::new(bid, ask, contract.mid));

            if day_idx <= contract.end_day {
                day.universe.push(contract.cid);
            }
            if contract.resolves && day_idx == contract.end_day {
                let settlement = if contract.mid >= 0.5 { 1.0 } else { 0.0 };
                day.resolutions.insert(contract.cid, settlement);
            }
        }

        day.universe.sort_unstable();
        days.push(day);
    }

    RecordedData::new(days)
}
