//! Atomic upsert transactions
//!
//! A [`Transaction`] is a list of [`UpsertOp`]s addressed purely by natural
//! key. Applying it either succeeds completely or leaves the store exactly
//! as it was: every mutation is recorded in an undo log that is replayed in
//! reverse on the first error.

use super::property::{PropertyMap, PropertyValue};
use super::store::{GraphError, GraphResult, GraphStore};
use super::types::{EdgeId, EdgeType, Label, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Natural key of a node: `(:label {property: value})`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeKey {
    pub label: Label,
    pub property: String,
    pub value: PropertyValue,
}

impl NodeKey {
    pub fn new(label: impl Into<Label>, property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(:{} {{{}: {}}})", self.label, self.property, self.value)
    }
}

/// A single match-or-create-then-overwrite operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpsertOp {
    MergeNode {
        key: NodeKey,
        properties: PropertyMap,
    },
    MergeEdge {
        edge_type: EdgeType,
        from: NodeKey,
        to: NodeKey,
        properties: PropertyMap,
    },
}

/// Ordered group of upserts committed atomically
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    ops: Vec<UpsertOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: UpsertOp) {
        self.ops.push(op);
    }

    /// Queue a node merge
    pub fn merge_node(&mut self, key: NodeKey, properties: PropertyMap) -> &mut Self {
        self.push(UpsertOp::MergeNode { key, properties });
        self
    }

    /// Queue an edge merge between two natural keys
    pub fn merge_edge(
        &mut self,
        edge_type: impl Into<EdgeType>,
        from: NodeKey,
        to: NodeKey,
        properties: PropertyMap,
    ) -> &mut Self {
        self.push(UpsertOp::MergeEdge {
            edge_type: edge_type.into(),
            from,
            to,
            properties,
        });
        self
    }

    pub fn ops(&self) -> &[UpsertOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<UpsertOp>> for Transaction {
    fn from(ops: Vec<UpsertOp>) -> Self {
        Self { ops }
    }
}

/// What a committed transaction did to the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub nodes_created: usize,
    pub nodes_matched: usize,
    pub edges_created: usize,
    pub edges_matched: usize,
    pub properties_set: usize,
}

impl TransactionStats {
    pub fn absorb(&mut self, other: &TransactionStats) {
        self.nodes_created += other.nodes_created;
        self.nodes_matched += other.nodes_matched;
        self.edges_created += other.edges_created;
        self.edges_matched += other.edges_matched;
        self.properties_set += other.properties_set;
    }
}

#[derive(Debug)]
pub(crate) enum UndoEntry {
    NodeCreated(NodeId),
    NodeProperty {
        id: NodeId,
        key: String,
        old: Option<PropertyValue>,
    },
    EdgeCreated(EdgeId),
    EdgeProperty {
        id: EdgeId,
        key: String,
        old: Option<PropertyValue>,
    },
}

/// Outcome of an applied transaction whose undo log is still held
#[derive(Debug)]
pub(crate) struct Applied {
    pub stats: TransactionStats,
    pub undo: Vec<UndoEntry>,
}

impl GraphStore {
    /// Match-or-create a node by natural key, then overwrite `properties`.
    pub fn merge_node(&mut self, key: &NodeKey, properties: &PropertyMap) -> GraphResult<NodeId> {
        let mut undo = Vec::new();
        let mut stats = TransactionStats::default();
        match self.merge_node_logged(key, properties, &mut undo, &mut stats) {
            Ok(id) => Ok(id),
            Err(e) => {
                self.rollback(undo);
                Err(e)
            }
        }
    }

    /// Match-or-create the edge `from -[edge_type]-> to`, then overwrite `properties`.
    pub fn merge_edge(
        &mut self,
        edge_type: &EdgeType,
        from: &NodeKey,
        to: &NodeKey,
        properties: &PropertyMap,
    ) -> GraphResult<EdgeId> {
        let mut undo = Vec::new();
        let mut stats = TransactionStats::default();
        match self.merge_edge_logged(edge_type, from, to, properties, &mut undo, &mut stats) {
            Ok(id) => Ok(id),
            Err(e) => {
                self.rollback(undo);
                Err(e)
            }
        }
    }

    /// Apply every op of `tx` or none of them.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> GraphResult<TransactionStats> {
        self.apply_logged(tx).map(|applied| applied.stats)
    }

    /// Apply `tx`, handing back the undo log so the caller can still revert
    /// it (e.g. when the WAL append fails afterwards).
    pub(crate) fn apply_logged(&mut self, tx: &Transaction) -> GraphResult<Applied> {
        let mut undo = Vec::new();
        let mut stats = TransactionStats::default();

        for op in tx.ops() {
            let result = match op {
                UpsertOp::MergeNode { key, properties } => self
                    .merge_node_logged(key, properties, &mut undo, &mut stats)
                    .map(|_| ()),
                UpsertOp::MergeEdge {
                    edge_type,
                    from,
                    to,
                    properties,
                } => self
                    .merge_edge_logged(edge_type, from, to, properties, &mut undo, &mut stats)
                    .map(|_| ()),
            };
            if let Err(e) = result {
                debug!("Transaction failed after {} undo entries: {}", undo.len(), e);
                self.rollback(undo);
                return Err(e);
            }
        }

        Ok(Applied { stats, undo })
    }

    /// Revert mutations in reverse order
    pub(crate) fn rollback(&mut self, undo: Vec<UndoEntry>) {
        for entry in undo.into_iter().rev() {
            let result = match entry {
                UndoEntry::NodeCreated(id) => self.discard_node(id).map(|_| ()),
                UndoEntry::EdgeCreated(id) => self.discard_edge(id).map(|_| ()),
                UndoEntry::NodeProperty { id, key, old } => match old {
                    Some(value) => self.set_node_property(id, key, value).map(|_| ()),
                    None => self.remove_node_property(id, &key).map(|_| ()),
                },
                UndoEntry::EdgeProperty { id, key, old } => match old {
                    Some(value) => self.set_edge_property(id, key, value).map(|_| ()),
                    None => self.remove_edge_property(id, &key).map(|_| ()),
                },
            };
            if let Err(e) = result {
                warn!("Rollback step failed: {}", e);
            }
        }
    }

    fn merge_node_logged(
        &mut self,
        key: &NodeKey,
        properties: &PropertyMap,
        undo: &mut Vec<UndoEntry>,
        stats: &mut TransactionStats,
    ) -> GraphResult<NodeId> {
        if key.value.is_blank() {
            return Err(GraphError::BlankKey {
                label: key.label.clone(),
                property: key.property.clone(),
            });
        }

        match self.find_node(&key.label, &key.property, &key.value) {
            Some(id) => {
                stats.nodes_matched += 1;
                for (name, value) in properties {
                    if name == &key.property {
                        continue;
                    }
                    let old = self.set_node_property(id, name.clone(), value.clone())?;
                    undo.push(UndoEntry::NodeProperty {
                        id,
                        key: name.clone(),
                        old,
                    });
                    stats.properties_set += 1;
                }
                Ok(id)
            }
            None => {
                let mut all = properties.clone();
                all.insert(key.property.clone(), key.value.clone());
                let id = self.create_node(key.label.clone(), all)?;
                undo.push(UndoEntry::NodeCreated(id));
                stats.nodes_created += 1;
                stats.properties_set += properties.keys().filter(|k| *k != &key.property).count();
                Ok(id)
            }
        }
    }

    fn merge_edge_logged(
        &mut self,
        edge_type: &EdgeType,
        from: &NodeKey,
        to: &NodeKey,
        properties: &PropertyMap,
        undo: &mut Vec<UndoEntry>,
        stats: &mut TransactionStats,
    ) -> GraphResult<EdgeId> {
        let source = self
            .find_node(&from.label, &from.property, &from.value)
            .ok_or_else(|| GraphError::EndpointNotFound(from.to_string()))?;
        let target = self
            .find_node(&to.label, &to.property, &to.value)
            .ok_or_else(|| GraphError::EndpointNotFound(to.to_string()))?;

        match self.find_edge(source, target, edge_type) {
            Some(id) => {
                stats.edges_matched += 1;
                for (name, value) in properties {
                    let old = self.set_edge_property(id, name.clone(), value.clone())?;
                    undo.push(UndoEntry::EdgeProperty {
                        id,
                        key: name.clone(),
                        old,
                    });
                    stats.properties_set += 1;
                }
                Ok(id)
            }
            None => {
                let id = self.create_edge(source, target, edge_type.clone(), properties.clone())?;
                undo.push(UndoEntry::EdgeCreated(id));
                stats.edges_created += 1;
                stats.properties_set += properties.len();
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SchemaOp;

    fn props(pairs: &[(&str, &str)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PropertyValue::from(*v)))
            .collect()
    }

    fn constrained_store() -> GraphStore {
        let mut store = GraphStore::new();
        store.apply_schema(&SchemaOp::unique("Trial", "nct_id")).unwrap();
        store.apply_schema(&SchemaOp::unique("Drug", "name")).unwrap();
        store
    }

    #[test]
    fn test_merge_node_matches_and_overwrites() {
        let mut store = constrained_store();
        let key = NodeKey::new("Trial", "nct_id", "NCT001");

        let a = store.merge_node(&key, &props(&[("status", "Recruiting")])).unwrap();
        let b = store.merge_node(&key, &props(&[("status", "Completed")])).unwrap();

        assert_eq!(a, b);
        assert_eq!(store.node_count(), 1);
        let node = store.get_node(a).unwrap();
        assert_eq!(node.get_property("status").unwrap().as_string(), Some("Completed"));
        assert_eq!(node.get_property("nct_id").unwrap().as_string(), Some("NCT001"));
    }

    #[test]
    fn test_blank_key_rejected() {
        let mut store = constrained_store();
        let err = store
            .merge_node(&NodeKey::new("Drug", "name", "  "), &PropertyMap::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::BlankKey { .. }));

        let err = store
            .merge_node(&NodeKey::new("Drug", "name", PropertyValue::Null), &PropertyMap::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::BlankKey { .. }));
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_merge_edge_single_edge_per_pair() {
        let mut store = constrained_store();
        let drug = NodeKey::new("Drug", "name", "Aspirin");
        let trial = NodeKey::new("Trial", "nct_id", "NCT001");
        let rel = EdgeType::new("STUDIED_IN");
        store.merge_node(&drug, &PropertyMap::new()).unwrap();
        store.merge_node(&trial, &PropertyMap::new()).unwrap();

        let e1 = store.merge_edge(&rel, &drug, &trial, &props(&[("route", "Unknown")])).unwrap();
        let e2 = store.merge_edge(&rel, &drug, &trial, &props(&[("route", "Oral")])).unwrap();

        assert_eq!(e1, e2);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(
            store.get_edge(e1).unwrap().get_property("route").unwrap().as_string(),
            Some("Oral")
        );
    }

    #[test]
    fn test_missing_endpoint() {
        let mut store = constrained_store();
        let err = store
            .merge_edge(
                &EdgeType::new("STUDIED_IN"),
                &NodeKey::new("Drug", "name", "Ghost"),
                &NodeKey::new("Trial", "nct_id", "NCT001"),
                &PropertyMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::EndpointNotFound(_)));
    }

    #[test]
    fn test_transaction_is_atomic() {
        let mut store = constrained_store();
        let existing = NodeKey::new("Trial", "nct_id", "NCT001");
        store.merge_node(&existing, &props(&[("status", "Recruiting")])).unwrap();

        let mut tx = Transaction::new();
        tx.merge_node(existing.clone(), props(&[("status", "Completed")]))
            .merge_node(NodeKey::new("Drug", "name", "Aspirin"), PropertyMap::new())
            .merge_edge(
                "STUDIED_IN",
                NodeKey::new("Drug", "name", "Aspirin"),
                existing.clone(),
                props(&[("route", "Oral")]),
            )
            .merge_node(NodeKey::new("Drug", "name", ""), PropertyMap::new());

        assert!(store.apply_transaction(&tx).is_err());
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.edge_count(), 0);
        let id = store.find_node(&existing.label, "nct_id", &existing.value).unwrap();
        assert_eq!(
            store.get_node(id).unwrap().get_property("status").unwrap().as_string(),
            Some("Recruiting")
        );
        assert_eq!(store.find_node(&Label::new("Drug"), "name", &"Aspirin".into()), None);
    }

    #[test]
    fn test_replayed_transaction_creates_nothing() {
        let mut store = constrained_store();
        let mut tx = Transaction::new();
        tx.merge_node(NodeKey::new("Trial", "nct_id", "NCT001"), props(&[("phase", "Phase3")]))
            .merge_node(NodeKey::new("Drug", "name", "Placebo"), PropertyMap::new())
            .merge_edge(
                "STUDIED_IN",
                NodeKey::new("Drug", "name", "Placebo"),
                NodeKey::new("Trial", "nct_id", "NCT001"),
                props(&[("route", "Unknown"), ("dosage_form", "Unknown")]),
            );

        let first = store.apply_transaction(&tx).unwrap();
        assert_eq!(first.nodes_created, 2);
        assert_eq!(first.edges_created, 1);

        let second = store.apply_transaction(&tx).unwrap();
        assert_eq!(second.nodes_created, 0);
        assert_eq!(second.edges_created, 0);
        assert_eq!(second.nodes_matched, 2);
        assert_eq!(second.edges_matched, 1);

        let mut total = first;
        total.absorb(&second);
        assert_eq!(total.nodes_created, 2);
    }

    #[test]
    fn test_node_key_display() {
        let key = NodeKey::new("Trial", "nct_id", "NCT00000102");
        assert_eq!(key.to_string(), "(:Trial {nct_id: \"NCT00000102\"})");
    }
}
