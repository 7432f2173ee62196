//! Daily Prediction-Market Simulation Engine
//!
//! Deterministic single-book accounting for binary-outcome contracts over a
//! sequence of simulated trading days.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         DailySim                            │
//! │  (owns Book + FillLog, drives one mutation per day)         │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!   ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//!   │ DataSource  │     │ PositionModel│     │ ResultStore │
//!   │ (per-day)   │     │ (targets)    │     │ (outputs)   │
//!   └─────────────┘     └──────────────┘     └─────────────┘
//!                             │
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Book                              │
//! │   capital · position · marks · execution accumulators       │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!   ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//!   │  Universe   │     │PositionChange│     │    Fifo     │
//!   │ (id↔index)  │     │ (leg split)  │     │ (lot match) │
//!   └─────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Index stability**: a contract's dense index never changes once
//!   assigned; per-index arrays stay valid as the universe grows.
//! - **All-or-nothing mutation**: input validation happens before any state
//!   moves; violated post-mutation invariants abort the process.
//! - **Determinism**: no wall-clock reads, seeded RNG only, deterministic
//!   iteration order for settlement application.

pub mod book;
pub mod error;
pub mod fifo;
pub mod fill;
pub mod market_data;
pub mod model;
pub mod position_change;
pub mod runner;
pub mod store;
pub mod universe;

#[cfg(test)]
mod book_tests;

// Re-exports for convenience
pub use book::{Book, BookSummary, ContractSummary};
pub use error::SimError;
pub use fifo::{Fifo, FifoEntry, SPREAD_FEE_RATE};
pub use fill::{Fill, FillLog};
pub use market_data::{ContractId, Price, PriceSnapshot, Qty, Quote, SnapshotView};
pub use model::{
    generate_synthetic, FixedWeightModel, HoldModel, MarketDataSource, PositionModel,
    RecordedData, RecordedDay, SyntheticConfig,
};
pub use position_change::PositionChange;
pub use runner::{DailySim, DayRecord, ModelConfig, SimConfig, SimResult};
pub use store::{ResultStore, RunRow, StoreError};
pub use universe::Universe;
