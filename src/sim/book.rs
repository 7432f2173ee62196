//! Trading Book
//!
//! The ledger at the center of the simulator. Tracks capital, per-contract
//! signed positions, mark valuation, execution accumulators, and the FIFO
//! cost-basis engine, over a universe that grows as contracts list and
//! shrinks (actively, never structurally) as they delist or resolve.
//!
//! # Capital Conventions
//!
//! Shorts are carried in the complementary representation: holding `-q` of a
//! contract is holding `q` of its NO outcome, bought at `1 - bid`. Cash flows
//! per leg:
//!
//! ```text
//! open long    pays     ask            close long   receives bid
//! open short   pays     1 - bid        cover short  receives 1 - ask
//! ```
//!
//! and a position is marked at `mark * long + (1 - mark) * short_magnitude`.
//! The book NAV identity `value == capital + sum(mark_value)` holds after
//! every mutating call.
//!
//! # Failure Semantics
//!
//! Mutating calls validate their inputs and return `Err` before touching any
//! state, so they are all-or-nothing. Post-mutation invariant checks abort
//! the process: there is no rollback, and a violated invariant means a caller
//! or programming defect, never a recoverable condition.

use crate::sim::error::SimError;
use crate::sim::fifo::{Fifo, FifoEntry};
use crate::sim::fill::Fill;
use crate::sim::market_data::{ContractId, Price, PriceSnapshot, Qty};
use crate::sim::position_change::PositionChange;
use crate::sim::universe::Universe;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Tolerance for float reconciliation checks on accumulated quantities.
const RECON_EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Book {
    universe: Universe,
    capital: f64,
    position: Vec<Qty>,
    mark_price: Vec<Price>,
    mark_value: Vec<f64>,
    /// Cumulative executed quantity, per contract.
    exe_qty: Vec<f64>,
    /// Cumulative executed notional, per contract.
    exe_value: Vec<f64>,
    /// Cash spent net of realizations (fee-inclusive), per contract.
    net_cost: Vec<f64>,
    /// Terminal contracts: settled, queue drained, position zero.
    resolved: Vec<bool>,
    value: f64,
    fifo: Fifo,
}

impl Book {
    /// Create a book with starting capital and an empty universe. One book
    /// per simulation run; it is mutated in place once per simulated day.
    pub fn new(capital: f64) -> Self {
        Self {
            universe: Universe::new(),
            capital,
            position: Vec::new(),
            mark_price: Vec::new(),
            mark_value: Vec::new(),
            exe_qty: Vec::new(),
            exe_value: Vec::new(),
            net_cost: Vec::new(),
            resolved: Vec::new(),
            value: capital,
            fifo: Fifo::new(),
        }
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    /// Book NAV: capital plus marked position value.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn position(&self) -> &[Qty] {
        &self.position
    }

    pub fn mark_price(&self) -> &[Price] {
        &self.mark_price
    }

    pub fn is_resolved(&self, idx: usize) -> bool {
        self.resolved[idx]
    }

    pub fn position_of(&self, cid: ContractId) -> Result<Qty, SimError> {
        Ok(self.position[self.universe.index_of(cid)?])
    }

    /// Grow and re-mask the universe for a new day.
    ///
    /// Any contract holding a position that drops out of `new_ids` is
    /// force-liquidated with a synthetic position change (at `snapshot`
    /// quotes) before it goes inactive; the synthetic fills are returned so
    /// the driver can log them. Newly listed contracts get zero-padded state
    /// and keep every previously assigned index unchanged.
    pub fn update_universe(
        &mut self,
        new_ids: &[ContractId],
        snapshot: &PriceSnapshot,
    ) -> Result<Vec<Fill>, SimError> {
        let keep: HashSet<ContractId> = new_ids.iter().copied().collect();

        let mut forced_target: Vec<Option<Qty>> = vec![None; self.universe.len()];
        let mut any_forced = false;
        for idx in 0..self.universe.len() {
            let cid = self.universe.id_at(idx);
            if self.position[idx] != 0.0 && !keep.contains(&cid) {
                forced_target[idx] = Some(0.0);
                any_forced = true;
                tracing::warn!(
                    cid,
                    position = self.position[idx],
                    "contract delisted with open position; forcing liquidation"
                );
            }
        }

        let fills = if any_forced {
            self.apply_position_change(&forced_target, snapshot)?
        } else {
            Vec::new()
        };

        let added = self.universe.update_cids(new_ids);
        let n = self.universe.len();
        self.position.resize(n, 0.0);
        self.mark_price.resize(n, 0.0);
        self.exe_qty.resize(n, 0.0);
        self.exe_value.resize(n, 0.0);
        self.net_cost.resize(n, 0.0);
        self.resolved.resize(n, false);
        if !added.is_empty() {
            tracing::debug!(added = added.len(), total = n, "universe grew");
        }

        self.recompute();
        self.check_invariants();
        Ok(fills)
    }

    /// Apply a target position vector against today's quotes.
    ///
    /// `None` targets mean "leave unchanged". Every contract with a nonzero
    /// delta must carry a valid two-sided quote and must not be resolved;
    /// either failure rejects the whole call before any state moves. Returns
    /// one fill per traded contract. A change with no deltas is a no-op.
    pub fn apply_position_change(
        &mut self,
        target: &[Option<Qty>],
        snapshot: &PriceSnapshot,
    ) -> Result<Vec<Fill>, SimError> {
        let n = self.universe.len();
        if target.len() != n {
            return Err(SimError::LengthMismatch {
                expected: n,
                actual: target.len(),
            });
        }

        let change = PositionChange::from_targets(&self.position, target);
        if change.is_noop() {
            return Ok(Vec::new());
        }

        // Validate every traded contract up front: all-or-nothing.
        let view = snapshot.reindex(&self.universe);
        let mut quotes: Vec<Option<(Price, Price)>> = vec![None; n];
        for idx in 0..n {
            if change.diff[idx] == 0.0 {
                continue;
            }
            let cid = self.universe.id_at(idx);
            if self.resolved[idx] {
                return Err(SimError::ContractResolved { cid });
            }
            match view.valid_two_sided(idx) {
                Some(pair) => quotes[idx] = Some(pair),
                None => return Err(SimError::MissingPriceData { cid }),
            }
        }

        let mut fills = Vec::new();
        let mut delta_capital = 0.0;
        for idx in 0..n {
            let Some((bid, ask)) = quotes[idx] else {
                continue;
            };
            let cid = self.universe.id_at(idx);
            let diff = change.diff[idx];

            let cover = change.buy_to_cover[idx];
            let open_long = change.buy_to_open[idx];
            let close_long = change.sell_to_close[idx];
            let open_short = change.sell_to_open[idx];

            // Complementary-short cash flows: opens pay, closes receive.
            let cash = cover * (1.0 - ask) - open_long * ask + close_long * bid
                - open_short * (1.0 - bid);
            delta_capital += cash;

            let leg_price = if diff > 0.0 { ask } else { 1.0 - bid };
            self.net_cost[idx] += self.fifo.apply(FifoEntry::new(cid, leg_price, diff));

            let notional = cover * (1.0 - ask)
                + open_long * ask
                + close_long * bid
                + open_short * (1.0 - bid);
            self.exe_qty[idx] += diff.abs();
            self.exe_value[idx] += notional;

            fills.push(Fill {
                cid,
                day: None,
                pos: self.position[idx],
                qty: diff,
                bid_price: bid,
                ask_price: ask,
                cost: -cash,
                exe_value: notional,
            });
        }

        self.capital += delta_capital;
        self.position.copy_from_slice(&change.new_pos);
        self.recompute();
        self.check_invariants();
        Ok(fills)
    }

    /// Apply terminal settlements.
    ///
    /// For each entry, credits `pos * settlement` for a long or
    /// `-pos * (1 - settlement)` for a short, zeroes the position, drains the
    /// contract's lot queue, and drops it from active tracking. Its index and
    /// historical accumulators are retained. Resolving an already-resolved
    /// contract is a no-op; an unknown id or out-of-domain settlement rejects
    /// the whole call before any state moves.
    pub fn apply_resolutions(
        &mut self,
        resolutions: &HashMap<ContractId, f64>,
    ) -> Result<(), SimError> {
        for (&cid, &settlement) in resolutions {
            if !(0.0..=1.0).contains(&settlement) {
                return Err(SimError::InvalidSettlement {
                    cid,
                    value: settlement,
                });
            }
            self.universe.index_of(cid)?;
        }

        // Deterministic application order regardless of map iteration.
        let mut items: Vec<(ContractId, f64)> =
            resolutions.iter().map(|(&c, &s)| (c, s)).collect();
        items.sort_by_key(|(cid, _)| *cid);

        for (cid, settlement) in items {
            let idx = self.universe.index_of(cid)?;
            if self.resolved[idx] {
                continue;
            }

            let pos = self.position[idx];
            if pos > 0.0 {
                self.capital += pos * settlement;
            } else if pos < 0.0 {
                self.capital += -pos * (1.0 - settlement);
            }

            self.net_cost[idx] += self.fifo.resolve(cid, settlement);
            self.position[idx] = 0.0;
            self.mark_price[idx] = settlement;
            self.resolved[idx] = true;
            self.universe.deactivate(cid)?;
            tracing::info!(cid, settlement, position = pos, "contract resolved");
        }

        self.recompute();
        self.check_invariants();
        Ok(())
    }

    /// Update marks from a snapshot. Only present trade prices overwrite;
    /// resolved contracts keep their settlement as the mark. Moves no cash.
    pub fn set_mark_price(&mut self, snapshot: &PriceSnapshot) {
        let view = snapshot.reindex(&self.universe);
        for idx in 0..self.universe.len() {
            if self.resolved[idx] {
                continue;
            }
            if let Some(mark) = view.trade_price[idx] {
                self.mark_price[idx] = mark;
            }
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        let n = self.universe.len();
        self.mark_value = (0..n)
            .map(|i| {
                let pos = self.position[i];
                self.mark_price[i] * pos.max(0.0) + (1.0 - self.mark_price[i]) * (-pos).max(0.0)
            })
            .collect();
        self.value = self.capital + self.mark_value.iter().sum::<f64>();
    }

    /// Eager reconciliation after every mutation. Violations abort.
    fn check_invariants(&self) {
        assert!(self.value.is_finite(), "book NAV is not finite");

        let nav = self.capital + self.mark_value.iter().sum::<f64>();
        assert!(
            (nav - self.value).abs() <= RECON_EPS * nav.abs().max(1.0),
            "book NAV out of sync with capital and mark value"
        );

        for idx in 0..self.universe.len() {
            let cid = self.universe.id_at(idx);
            let lot_net = self.fifo.net_qty(cid);
            assert!(
                (lot_net - self.position[idx]).abs() <= RECON_EPS * self.position[idx].abs().max(1.0),
                "lot queue for contract {} nets {} but book position is {}",
                cid,
                lot_net,
                self.position[idx]
            );
        }
    }

    /// Book-level summary across all contracts.
    pub fn summary(&self) -> BookSummary {
        let pos_value: f64 = self.mark_value.iter().sum();
        let net_cost: f64 = self.net_cost.iter().sum();
        let pos_cost = self.fifo.total_pos_cost();
        BookSummary {
            capital: self.capital,
            pos_value,
            value: self.value,
            exe_qty: self.exe_qty.iter().sum(),
            exe_value: self.exe_value.iter().sum(),
            net_cost,
            pos_cost,
            realized_pnl: self.fifo.total_realized_pnl(),
            fees: self.fifo.total_fees(),
            mark_pnl: pos_value - net_cost,
            unrealized_pnl: pos_value - pos_cost,
        }
    }

    /// One summary row per known contract, index order.
    pub fn contract_summaries(&self) -> Vec<ContractSummary> {
        (0..self.universe.len())
            .map(|idx| {
                let cid = self.universe.id_at(idx);
                let pos_cost = self.fifo.pos_cost(cid);
                ContractSummary {
                    cid,
                    active: self.universe.is_active(idx),
                    resolved: self.resolved[idx],
                    position: self.position[idx],
                    mark_price: self.mark_price[idx],
                    mark_value: self.mark_value[idx],
                    exe_qty: self.exe_qty[idx],
                    exe_value: self.exe_value[idx],
                    net_cost: self.net_cost[idx],
                    pos_cost,
                    realized_pnl: self.fifo.realized_pnl(cid),
                    fees: self.fifo.fees(cid),
                    unrealized_pnl: self.mark_value[idx] - pos_cost,
                    mark_pnl: self.mark_value[idx] - self.net_cost[idx],
                }
            })
            .collect()
    }
}

/// Book-level daily summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    pub capital: f64,
    /// Marked value of all open positions.
    pub pos_value: f64,
    /// NAV: capital + pos_value.
    pub value: f64,
    pub exe_qty: f64,
    pub exe_value: f64,
    pub net_cost: f64,
    pub pos_cost: f64,
    pub realized_pnl: f64,
    pub fees: f64,
    pub mark_pnl: f64,
    pub unrealized_pnl: f64,
}

/// Per-contract daily summary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSummary {
    pub cid: ContractId,
    pub active: bool,
    pub resolved: bool,
    pub position: Qty,
    pub mark_price: Price,
    pub mark_value: f64,
    pub exe_qty: f64,
    pub exe_value: f64,
    pub net_cost: f64,
    pub pos_cost: f64,
    pub realized_pnl: f64,
    pub fees: f64,
    pub unrealized_pnl: f64,
    pub mark_pnl: f64,
}
