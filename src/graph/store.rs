//! In-memory graph storage implementation

use super::edge::Edge;
use super::node::Node;
use super::property::{PropertyMap, PropertyValue};
use super::schema::{SchemaOp, SchemaOutcome};
use super::types::{EdgeId, EdgeType, Label, NodeId};
use crate::index::{IndexManager, PropertyIndex, PropertyIndexKey, UniqueConflict, UniqueIndex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during graph operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("Invalid edge: source node {0} does not exist")]
    InvalidEdgeSource(NodeId),

    #[error("Invalid edge: target node {0} does not exist")]
    InvalidEdgeTarget(NodeId),

    #[error("Constraint violation on {key}: value {value} is already held by {owner}")]
    UniqueViolation {
        key: PropertyIndexKey,
        value: PropertyValue,
        owner: NodeId,
    },

    #[error("Constraint violation on {label}.{property}: natural key must not be blank")]
    BlankKey { label: Label, property: String },

    #[error("Relationship endpoint {0} not found")]
    EndpointNotFound(String),

    #[error("Cannot create unique constraint on {key}: value {value} is held by more than one node")]
    ExistingDuplicates { key: PropertyIndexKey, value: PropertyValue },
}

pub type GraphResult<T> = Result<T, GraphError>;

/// In-memory graph storage
///
/// Arena layout, ids are positions:
/// - nodes: NodeId -> Node
/// - edges: EdgeId -> Edge
/// - outgoing / incoming: NodeId -> Vec<EdgeId> (adjacency lists)
/// - label_index: Label -> NodeIds
/// - edge_type_index: EdgeType -> EdgeIds
///
/// Nothing is ever deleted by the loader; the only removals are
/// transaction rollbacks, which always discard the most recent entries.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
    label_index: HashMap<Label, HashSet<NodeId>>,
    edge_type_index: HashMap<EdgeType, HashSet<EdgeId>>,
    indexes: IndexManager,
}

impl GraphStore {
    /// Create a new empty graph store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node with a single label and initial properties
    pub fn create_node(&mut self, label: impl Into<Label>, properties: PropertyMap) -> GraphResult<NodeId> {
        let node_id = NodeId::new(self.nodes.len() as u64);
        let label = label.into();
        let labels: HashSet<Label> = std::iter::once(label.clone()).collect();

        // Claim index entries first so a constraint violation leaves no trace.
        let mut indexed: Vec<&String> = Vec::with_capacity(properties.len());
        for (key, value) in &properties {
            if let Err(conflict) = self.indexes.on_property_set(&labels, key, None, Some(value), node_id) {
                for done in indexed {
                    let _ = self.indexes.on_property_set(&labels, done, properties.get(done), None, node_id);
                }
                return Err(violation(conflict, value));
            }
            indexed.push(key);
        }

        self.label_index.entry(label.clone()).or_default().insert(node_id);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.nodes.push(Node::new(node_id, label, properties));
        Ok(node_id)
    }

    /// Get a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Check if a node exists
    pub fn has_node(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Set a property on a node, keeping constraints and indexes in sync.
    ///
    /// Returns the previous value.
    pub fn set_node_property(
        &mut self,
        node_id: NodeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> GraphResult<Option<PropertyValue>> {
        let key = key.into();
        let value = value.into();
        let node = self
            .nodes
            .get_mut(node_id.index())
            .ok_or(GraphError::NodeNotFound(node_id))?;

        let old = node.properties.get(&key).cloned();
        self.indexes
            .on_property_set(&node.labels, &key, old.as_ref(), Some(&value), node_id)
            .map_err(|conflict| violation(conflict, &value))?;
        node.set_property(key, value);
        Ok(old)
    }

    /// Remove a property from a node, returning it
    pub fn remove_node_property(&mut self, node_id: NodeId, key: &str) -> GraphResult<Option<PropertyValue>> {
        let node = self
            .nodes
            .get_mut(node_id.index())
            .ok_or(GraphError::NodeNotFound(node_id))?;

        let old = node.remove_property(key);
        if let Some(value) = &old {
            // Removal never conflicts.
            let _ = self
                .indexes
                .on_property_set(&node.labels, key, Some(value), None, node_id);
        }
        Ok(old)
    }

    /// Create a directed edge between two existing nodes
    pub fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId> {
        if !self.has_node(source) {
            return Err(GraphError::InvalidEdgeSource(source));
        }
        if !self.has_node(target) {
            return Err(GraphError::InvalidEdgeTarget(target));
        }

        let edge_id = EdgeId::new(self.edges.len() as u64);
        let edge_type = edge_type.into();

        self.outgoing[source.index()].push(edge_id);
        self.incoming[target.index()].push(edge_id);
        self.edge_type_index
            .entry(edge_type.clone())
            .or_default()
            .insert(edge_id);
        self.edges
            .push(Edge::new_with_properties(edge_id, source, target, edge_type, properties));
        Ok(edge_id)
    }

    /// Get an edge by ID
    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    /// Set a property on an edge, returning the previous value
    pub fn set_edge_property(
        &mut self,
        edge_id: EdgeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> GraphResult<Option<PropertyValue>> {
        let edge = self
            .edges
            .get_mut(edge_id.index())
            .ok_or(GraphError::EdgeNotFound(edge_id))?;
        Ok(edge.set_property(key, value))
    }

    /// Remove a property from an edge, returning it
    pub fn remove_edge_property(&mut self, edge_id: EdgeId, key: &str) -> GraphResult<Option<PropertyValue>> {
        let edge = self
            .edges
            .get_mut(edge_id.index())
            .ok_or(GraphError::EdgeNotFound(edge_id))?;
        Ok(edge.remove_property(key))
    }

    /// Find the node with `label` whose `property` equals `value`.
    ///
    /// Uses the unique constraint on `(label, property)` when declared and
    /// falls back to a label scan otherwise (lowest id wins).
    pub fn find_node(&self, label: &Label, property: &str, value: &PropertyValue) -> Option<NodeId> {
        let key = PropertyIndexKey::new(label.clone(), property);
        if self.indexes.has_unique_constraint(&key) {
            return self.indexes.unique_owner(&key, value);
        }
        self.label_index
            .get(label)?
            .iter()
            .filter(|id| {
                self.get_node(**id)
                    .and_then(|n| n.get_property(property))
                    .map_or(false, |v| v == value)
            })
            .min()
            .copied()
    }

    /// All nodes with `label` whose `property` equals `value`, ordered by id.
    ///
    /// Served from a secondary index when one exists.
    pub fn find_nodes_by_property(&self, label: &Label, property: &str, value: &PropertyValue) -> Vec<&Node> {
        let key = PropertyIndexKey::new(label.clone(), property);
        let mut ids = match self.indexes.lookup(&key, value) {
            Some(ids) => ids,
            None => self
                .label_index
                .get(label)
                .map(|ids| {
                    ids.iter()
                        .copied()
                        .filter(|id| {
                            self.get_node(*id)
                                .and_then(|n| n.get_property(property))
                                .map_or(false, |v| v == value)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        };
        ids.sort();
        ids.into_iter().filter_map(|id| self.get_node(id)).collect()
    }

    /// Find the edge `source -[edge_type]-> target`.
    ///
    /// Walks the shorter of the source's outgoing and the target's incoming list.
    pub fn find_edge(&self, source: NodeId, target: NodeId, edge_type: &EdgeType) -> Option<EdgeId> {
        let outgoing = self.outgoing.get(source.index())?;
        let incoming = self.incoming.get(target.index())?;
        let candidates = if outgoing.len() <= incoming.len() { outgoing } else { incoming };

        candidates.iter().copied().find(|id| {
            self.get_edge(*id)
                .map_or(false, |e| e.links(source, target, edge_type))
        })
    }

    /// Get all outgoing edges from a node
    pub fn get_outgoing_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.outgoing
            .get(node_id.index())
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    /// Get all incoming edges to a node
    pub fn get_incoming_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.incoming
            .get(node_id.index())
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    /// Get all nodes with a specific label, ordered by id
    pub fn get_nodes_by_label(&self, label: &Label) -> Vec<&Node> {
        let mut ids: Vec<NodeId> = self
            .label_index
            .get(label)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids.into_iter().filter_map(|id| self.get_node(id)).collect()
    }

    /// Get all edges of a specific type, ordered by id
    pub fn get_edges_by_type(&self, edge_type: &EdgeType) -> Vec<&Edge> {
        let mut ids: Vec<EdgeId> = self
            .edge_type_index
            .get(edge_type)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids.into_iter().filter_map(|id| self.get_edge(id)).collect()
    }

    /// Get total number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get total number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node count per label, sorted by label
    pub fn label_counts(&self) -> Vec<(Label, usize)> {
        let mut counts: Vec<_> = self
            .label_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, ids)| (label.clone(), ids.len()))
            .collect();
        counts.sort();
        counts
    }

    /// Edge count per relationship type, sorted by type
    pub fn edge_type_counts(&self) -> Vec<(EdgeType, usize)> {
        let mut counts: Vec<_> = self
            .edge_type_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(edge_type, ids)| (edge_type.clone(), ids.len()))
            .collect();
        counts.sort();
        counts
    }

    /// Constraint and index catalogue
    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    /// Declare a constraint or index, create-if-absent.
    ///
    /// New indexes are back-filled from existing nodes. A unique constraint
    /// over data that already holds duplicates is rejected.
    pub fn apply_schema(&mut self, op: &SchemaOp) -> GraphResult<SchemaOutcome> {
        let key = PropertyIndexKey::new(op.label().clone(), op.property());
        let exists = match op {
            SchemaOp::UniqueConstraint { .. } => self.indexes.has_unique_constraint(&key),
            SchemaOp::Index { .. } => self.indexes.has_index(&key),
        };
        if exists {
            debug!("Schema already present: {}", op);
            return Ok(SchemaOutcome::AlreadyExists);
        }

        let existing: Vec<(NodeId, PropertyValue)> = self
            .get_nodes_by_label(&key.label)
            .into_iter()
            .filter_map(|n| n.get_property(&key.property).map(|v| (n.id, v.clone())))
            .collect();

        match op {
            SchemaOp::UniqueConstraint { .. } => {
                let mut index = UniqueIndex::new();
                for (id, value) in existing {
                    if let Some(indexed) = value.index_value() {
                        if index.claim(indexed, id).is_err() {
                            return Err(GraphError::ExistingDuplicates { key, value });
                        }
                    }
                }
                self.indexes.install_unique(key, index);
            }
            SchemaOp::Index { .. } => {
                let mut index = PropertyIndex::new();
                for (id, value) in existing {
                    if let Some(indexed) = value.index_value() {
                        index.insert(indexed, id);
                    }
                }
                self.indexes.install_index(key, index);
            }
        }
        debug!("Schema created: {}", op);
        Ok(SchemaOutcome::Created)
    }

    /// Drop the most recently created node.
    ///
    /// Only used to undo a transaction, after its edges were discarded.
    pub(crate) fn discard_node(&mut self, node_id: NodeId) -> GraphResult<Node> {
        if node_id.index() + 1 != self.nodes.len() {
            return Err(GraphError::NodeNotFound(node_id));
        }
        let node = self.nodes.pop().ok_or(GraphError::NodeNotFound(node_id))?;
        self.outgoing.pop();
        self.incoming.pop();
        for label in &node.labels {
            if let Some(ids) = self.label_index.get_mut(label) {
                ids.remove(&node_id);
            }
        }
        self.indexes.on_node_removed(&node.labels, &node.properties, node_id);
        Ok(node)
    }

    /// Drop the most recently created edge
    pub(crate) fn discard_edge(&mut self, edge_id: EdgeId) -> GraphResult<Edge> {
        if edge_id.index() + 1 != self.edges.len() {
            return Err(GraphError::EdgeNotFound(edge_id));
        }
        let edge = self.edges.pop().ok_or(GraphError::EdgeNotFound(edge_id))?;
        if let Some(adj) = self.outgoing.get_mut(edge.source.index()) {
            adj.retain(|&id| id != edge_id);
        }
        if let Some(adj) = self.incoming.get_mut(edge.target.index()) {
            adj.retain(|&id| id != edge_id);
        }
        if let Some(ids) = self.edge_type_index.get_mut(&edge.edge_type) {
            ids.remove(&edge_id);
        }
        Ok(edge)
    }
}

fn violation(conflict: UniqueConflict, value: &PropertyValue) -> GraphError {
    GraphError::UniqueViolation {
        key: conflict.key,
        value: value.clone(),
        owner: conflict.owner,
    }
}
