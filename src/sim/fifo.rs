//! FIFO Lot Matching
//!
//! Converts a stream of signed daily fills into lot-level cost basis,
//! realized PnL, and captured-spread fees, one queue per contract in strict
//! arrival order.
//!
//! Matching a long lot against a short lot locks in the guaranteed payoff of
//! one: both sides were paid for, and the pair nets to one unit of certain
//! value at settlement. The residual `1 - long_price - short_price` is the
//! captured spread, taxed at 10% when positive.
//!
//! # Invariant
//!
//! After every `apply`, each queue is empty or uniformly signed (all-long or
//! all-short). A mixed-sign queue means the matching loop is broken and the
//! process aborts.

use crate::sim::market_data::{ContractId, Price, Qty};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Fee rate charged on positively captured spread.
pub const SPREAD_FEE_RATE: f64 = 0.1;

/// An open lot: a position increment with a fixed acquisition price.
///
/// `price` is the cost to grow the long (qty > 0) or short (qty < 0) side by
/// one unit; shorts carry the complementary price `1 - bid`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FifoEntry {
    pub cid: ContractId,
    pub price: Price,
    pub qty: Qty,
}

impl FifoEntry {
    pub fn new(cid: ContractId, price: Price, qty: Qty) -> Self {
        assert!(price >= 0.0, "lot price must be non-negative");
        assert!(qty != 0.0, "lot quantity must be nonzero");
        Self { cid, price, qty }
    }
}

/// Per-contract FIFO queues with running realized-PnL and fee totals.
///
/// Totals survive resolution so historical summaries keep per-contract
/// realized PnL after the queue itself is gone.
#[derive(Debug, Clone, Default)]
pub struct Fifo {
    queues: HashMap<ContractId, VecDeque<FifoEntry>>,
    realized: HashMap<ContractId, f64>,
    fee_totals: HashMap<ContractId, f64>,
}

impl Fifo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one signed fill.
    ///
    /// If the queue is empty or front-sign-matched, the fill opens a new lot.
    /// Otherwise front lots are drained against it in arrival order until the
    /// signs agree again; any remainder opens a new lot.
    ///
    /// Returns the cost charged against the book's net-cost accumulator:
    /// every matched slice contributes `fee + qty * (price - 1)` (negative is
    /// a realization), a residual open contributes `|qty * price|`.
    pub fn apply(&mut self, entry: FifoEntry) -> f64 {
        let cid = entry.cid;
        let mut entry = entry;
        let queue = self.queues.entry(cid).or_default();

        let mut cost = 0.0;
        let mut realized = 0.0;
        let mut fees = 0.0;
        let mut matched_any = false;

        while entry.qty != 0.0 {
            let Some(front) = queue.front_mut() else {
                break;
            };
            if (front.qty > 0.0) == (entry.qty > 0.0) {
                break;
            }

            let match_qty = front.qty.abs().min(entry.qty.abs());
            let spread = 1.0 - front.price - entry.price;
            let fee = (SPREAD_FEE_RATE * match_qty * spread).max(0.0);
            realized += match_qty * spread;
            fees += fee;
            cost += fee + match_qty * (entry.price - 1.0);
            matched_any = true;

            // Shrink both sides toward zero by the matched quantity.
            front.qty -= match_qty * front.qty.signum();
            entry.qty -= match_qty * entry.qty.signum();
            if front.qty == 0.0 {
                queue.pop_front();
            }
        }

        if entry.qty != 0.0 {
            cost += (entry.price * entry.qty).abs();
            queue.push_back(entry);
        }

        if matched_any {
            *self.realized.entry(cid).or_insert(0.0) += realized;
            *self.fee_totals.entry(cid).or_insert(0.0) += fees;
        }

        self.check_queue(cid);
        cost
    }

    /// Close out a contract at its terminal settlement value.
    ///
    /// Synthesizes an offsetting fill sized to net the queue to exactly zero:
    /// priced at `settlement` when buying back a short book, at
    /// `1 - settlement` when selling out a long book. Afterwards the queue
    /// must be empty and the contract leaves active tracking. Returns the
    /// net-cost contribution of the synthetic fill.
    pub fn resolve(&mut self, cid: ContractId, settlement: Price) -> f64 {
        assert!(
            (0.0..=1.0).contains(&settlement),
            "settlement must lie in [0, 1]"
        );

        let Some(queue) = self.queues.get(&cid) else {
            return 0.0;
        };

        let net: Qty = queue.iter().map(|e| e.qty).sum();
        let mut cost = 0.0;
        if net != 0.0 {
            let offset_qty = -net;
            let price = if offset_qty > 0.0 {
                settlement
            } else {
                1.0 - settlement
            };
            cost = self.apply(FifoEntry {
                cid,
                price,
                qty: offset_qty,
            });
        }

        assert!(
            self.queues.get(&cid).map_or(true, |q| q.is_empty()),
            "lot queue for contract {} not empty after resolution",
            cid
        );
        self.queues.remove(&cid);
        cost
    }

    /// Signed net quantity across a contract's open lots.
    pub fn net_qty(&self, cid: ContractId) -> Qty {
        self.queues
            .get(&cid)
            .map_or(0.0, |q| q.iter().map(|e| e.qty).sum())
    }

    /// Capital currently locked in a contract's open lots, at cost.
    pub fn pos_cost(&self, cid: ContractId) -> f64 {
        self.queues
            .get(&cid)
            .map_or(0.0, |q| q.iter().map(|e| (e.qty * e.price).abs()).sum())
    }

    pub fn total_pos_cost(&self) -> f64 {
        self.queues
            .values()
            .flat_map(|q| q.iter())
            .map(|e| (e.qty * e.price).abs())
            .sum()
    }

    pub fn realized_pnl(&self, cid: ContractId) -> f64 {
        self.realized.get(&cid).copied().unwrap_or(0.0)
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.realized.values().sum()
    }

    pub fn fees(&self, cid: ContractId) -> f64 {
        self.fee_totals.get(&cid).copied().unwrap_or(0.0)
    }

    pub fn total_fees(&self) -> f64 {
        self.fee_totals.values().sum()
    }

    pub fn lot_count(&self, cid: ContractId) -> usize {
        self.queues.get(&cid).map_or(0, |q| q.len())
    }

    /// Post-condition: a queue is empty or uniformly signed.
    fn check_queue(&self, cid: ContractId) {
        if let Some(queue) = self.queues.get(&cid) {
            let all_long = queue.iter().all(|e| e.qty > 0.0);
            let all_short = queue.iter().all(|e| e.qty < 0.0);
            assert!(
                all_long || all_short,
                "mixed-sign lot queue for contract {}",
                cid
            );
        }
    }
}
