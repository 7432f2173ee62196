//! Error Taxonomy
//!
//! Input-validation failures surface as `SimError` before any state is
//! mutated, so mutating calls stay all-or-nothing. Violated post-mutation
//! invariants are programming defects and abort the process instead; a
//! corrupted book must never produce a summary.

use crate::sim::market_data::ContractId;

#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Operation referenced an id the universe has never seen.
    UnknownContract { cid: ContractId },

    /// A position change touched a contract without a valid two-sided quote.
    MissingPriceData { cid: ContractId },

    /// A position change touched a contract that already settled.
    ContractResolved { cid: ContractId },

    /// Settlement value outside the binary domain [0, 1].
    InvalidSettlement { cid: ContractId, value: f64 },

    /// Caller-provided vector does not match the universe length.
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::UnknownContract { cid } => {
                write!(f, "unknown contract id {}", cid)
            }
            SimError::MissingPriceData { cid } => {
                write!(f, "no valid bid/ask for contract {} with requested position change", cid)
            }
            SimError::ContractResolved { cid } => {
                write!(f, "position change requested on resolved contract {}", cid)
            }
            SimError::InvalidSettlement { cid, value } => {
                write!(f, "settlement {} for contract {} outside [0, 1]", value, cid)
            }
            SimError::LengthMismatch { expected, actual } => {
                write!(f, "vector length {} does not match universe size {}", actual, expected)
            }
        }
    }
}

impl std::error::Error for SimError {}
