//! Property indexes: B-Tree secondary indexes and unique-key indexes

use crate::graph::{IndexValue, NodeId};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// Secondary index for a specific property on a specific label
#[derive(Debug, Clone, Default)]
pub struct PropertyIndex {
    /// Value -> Set of NodeIds
    index: BTreeMap<IndexValue, BTreeSet<NodeId>>,
}

impl PropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: IndexValue, node_id: NodeId) {
        self.index.entry(value).or_default().insert(node_id);
    }

    pub fn remove(&mut self, value: &IndexValue, node_id: NodeId) {
        if let Some(nodes) = self.index.get_mut(value) {
            nodes.remove(&node_id);
            if nodes.is_empty() {
                self.index.remove(value);
            }
        }
    }

    pub fn get(&self, value: &IndexValue) -> Vec<NodeId> {
        self.index
            .get(value)
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct indexed values
    pub fn distinct_values(&self) -> usize {
        self.index.len()
    }
}

/// Index backing a uniqueness constraint: every value maps to exactly one node
#[derive(Debug, Clone, Default)]
pub struct UniqueIndex {
    owners: FxHashMap<IndexValue, NodeId>,
}

impl UniqueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node currently holding `value`, if any
    pub fn owner(&self, value: &IndexValue) -> Option<NodeId> {
        self.owners.get(value).copied()
    }

    /// Claim `value` for `node_id`.
    ///
    /// Returns the conflicting owner when another node already holds it.
    pub fn claim(&mut self, value: IndexValue, node_id: NodeId) -> Result<(), NodeId> {
        match self.owners.get(&value) {
            Some(&owner) if owner != node_id => Err(owner),
            _ => {
                self.owners.insert(value, node_id);
                Ok(())
            }
        }
    }

    pub fn release(&mut self, value: &IndexValue, node_id: NodeId) {
        if self.owners.get(value) == Some(&node_id) {
            self.owners.remove(value);
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
