//! Market Data Types
//!
//! Daily quote snapshots keyed by contract id, plus the dense view obtained
//! by reindexing a snapshot to the book's universe order. Missing quotes are
//! explicit `None`s, never NaN sentinels.

use crate::sim::universe::Universe;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque integer key for a binary contract (price domain 0.0 to 1.0).
pub type ContractId = u64;

/// Price in the native market format (0.0 to 1.0).
pub type Price = f64;

/// Signed contract quantity (positive = long, negative = short).
pub type Qty = f64;

/// One contract's quotes for a single day.
///
/// A `None` field means no quote. Contracts without both a valid bid and ask
/// must not be traded against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid_price: Option<Price>,
    pub ask_price: Option<Price>,
    pub trade_price: Option<Price>,
}

impl Quote {
    pub fn new(bid: Price, ask: Price, trade: Price) -> Self {
        Self {
            bid_price: Some(bid),
            ask_price: Some(ask),
            trade_price: Some(trade),
        }
    }

    /// Both sides present and inside the binary price domain.
    pub fn two_sided(&self) -> bool {
        matches!(
            (self.bid_price, self.ask_price),
            (Some(b), Some(a)) if (0.0..=1.0).contains(&b) && (0.0..=1.0).contains(&a)
        )
    }
}

/// A per-day snapshot of quotes, keyed by contract id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub quotes: HashMap<ContractId, Quote>,
}

impl PriceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cid: ContractId, quote: Quote) {
        self.quotes.insert(cid, quote);
    }

    pub fn get(&self, cid: ContractId) -> Option<&Quote> {
        self.quotes.get(&cid)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Reindex to the universe's dense order.
    ///
    /// Snapshot ids the universe has never seen are ignored; universe ids
    /// missing from the snapshot come back as all-`None` entries.
    pub fn reindex(&self, universe: &Universe) -> SnapshotView {
        let n = universe.len();
        let mut view = SnapshotView {
            bid_price: vec![None; n],
            ask_price: vec![None; n],
            trade_price: vec![None; n],
        };
        for (cid, quote) in &self.quotes {
            if let Some(idx) = universe.try_index_of(*cid) {
                view.bid_price[idx] = quote.bid_price;
                view.ask_price[idx] = quote.ask_price;
                view.trade_price[idx] = quote.trade_price;
            }
        }
        view
    }
}

/// Quotes laid out in universe index order.
#[derive(Debug, Clone, Default)]
pub struct SnapshotView {
    pub bid_price: Vec<Option<Price>>,
    pub ask_price: Vec<Option<Price>>,
    pub trade_price: Vec<Option<Price>>,
}

impl SnapshotView {
    pub fn len(&self) -> usize {
        self.bid_price.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bid_price.is_empty()
    }

    /// Bid/ask pair for `idx`, present and inside [0, 1].
    pub fn valid_two_sided(&self, idx: usize) -> Option<(Price, Price)> {
        match (self.bid_price[idx], self.ask_price[idx]) {
            (Some(bid), Some(ask))
                if (0.0..=1.0).contains(&bid) && (0.0..=1.0).contains(&ask) =>
            {
                Some((bid, ask))
            }
            _ => None,
        }
    }
}
