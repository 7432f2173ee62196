//! Contract Universe
//!
//! Growable, order-stable registry of contract ids. An id is assigned a dense
//! array index the first time it is seen and keeps that index for the life of
//! the process, so callers may cache index-addressed arrays across days while
//! the universe grows. Shrinking only flips the "active" mask; indices and
//! history are never reclaimed.

use crate::sim::error::SimError;
use crate::sim::market_data::ContractId;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Universe {
    /// Known ids in index order. Append-only.
    ids: Vec<ContractId>,
    /// id -> dense index.
    index: HashMap<ContractId, usize>,
    /// Tradable-today mask, recomputed on every `update_cids`.
    active: Vec<bool>,
}

impl Universe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register today's tradable ids.
    ///
    /// Ids not seen before are sorted ascending and appended after all
    /// existing entries; existing indices never move. The active mask is then
    /// recomputed from `ids` alone: known contracts absent from `ids` go
    /// inactive but keep their index. Returns the newly assigned ids in
    /// index order.
    pub fn update_cids(&mut self, ids: &[ContractId]) -> Vec<ContractId> {
        let mut fresh: Vec<ContractId> = ids
            .iter()
            .copied()
            .filter(|cid| !self.index.contains_key(cid))
            .collect();
        fresh.sort_unstable();
        fresh.dedup();

        for cid in &fresh {
            self.index.insert(*cid, self.ids.len());
            self.ids.push(*cid);
            self.active.push(false);
        }

        for flag in self.active.iter_mut() {
            *flag = false;
        }
        for cid in ids {
            self.active[self.index[cid]] = true;
        }

        fresh
    }

    /// Drop a contract from active tracking without touching its index.
    pub fn deactivate(&mut self, cid: ContractId) -> Result<(), SimError> {
        let idx = self.index_of(cid)?;
        self.active[idx] = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, cid: ContractId) -> bool {
        self.index.contains_key(&cid)
    }

    /// Dense index of `cid`. Unknown ids are a usage error.
    pub fn index_of(&self, cid: ContractId) -> Result<usize, SimError> {
        self.try_index_of(cid)
            .ok_or(SimError::UnknownContract { cid })
    }

    pub fn try_index_of(&self, cid: ContractId) -> Option<usize> {
        self.index.get(&cid).copied()
    }

    /// Dense-index translation for a batch of ids.
    pub fn indices_of(&self, cids: &[ContractId]) -> Result<Vec<usize>, SimError> {
        cids.iter().map(|&cid| self.index_of(cid)).collect()
    }

    pub fn id_at(&self, idx: usize) -> ContractId {
        self.ids[idx]
    }

    pub fn ids(&self) -> &[ContractId] {
        &self.ids
    }

    pub fn is_active(&self, idx: usize) -> bool {
        self.active[idx]
    }

    pub fn active_mask(&self) -> &[bool] {
        &self.active
    }

    pub fn active_ids(&self) -> Vec<ContractId> {
        self.ids
            .iter()
            .zip(&self.active)
            .filter(|(_, &active)| active)
            .map(|(&cid, _)| cid)
            .collect()
    }
}
