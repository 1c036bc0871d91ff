//! Manager for uniqueness constraints and property indices
//!
//! Handles creation of, maintenance of, and lookups through the indexes
//! declared on `(label, property)` pairs.

use super::property_index::{PropertyIndex, UniqueIndex};
use crate::graph::{Label, NodeId, PropertyMap, PropertyValue};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Key for identifying a constraint or property index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyIndexKey {
    pub label: Label,
    pub property: String,
}

impl PropertyIndexKey {
    pub fn new(label: impl Into<Label>, property: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
        }
    }
}

impl fmt::Display for PropertyIndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.label, self.property)
    }
}

/// A uniqueness constraint that a write would break
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConflict {
    pub key: PropertyIndexKey,
    pub owner: NodeId,
}

/// Manager for all constraints and property indices of one graph
#[derive(Debug, Default)]
pub struct IndexManager {
    unique: HashMap<PropertyIndexKey, UniqueIndex>,
    indices: HashMap<PropertyIndexKey, PropertyIndex>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a uniqueness constraint exists
    pub fn has_unique_constraint(&self, key: &PropertyIndexKey) -> bool {
        self.unique.contains_key(key)
    }

    /// Check if a secondary index exists
    pub fn has_index(&self, key: &PropertyIndexKey) -> bool {
        self.indices.contains_key(key)
    }

    /// Register a back-filled unique index. Returns false if one was already present.
    pub(crate) fn install_unique(&mut self, key: PropertyIndexKey, index: UniqueIndex) -> bool {
        if self.unique.contains_key(&key) {
            return false;
        }
        self.unique.insert(key, index);
        true
    }

    /// Register a back-filled secondary index. Returns false if one was already present.
    pub(crate) fn install_index(&mut self, key: PropertyIndexKey, index: PropertyIndex) -> bool {
        if self.indices.contains_key(&key) {
            return false;
        }
        self.indices.insert(key, index);
        true
    }

    /// Node holding `value` under the unique constraint on `key`.
    ///
    /// `None` both when the constraint does not exist and when no node holds the value.
    pub fn unique_owner(&self, key: &PropertyIndexKey, value: &PropertyValue) -> Option<NodeId> {
        let index = self.unique.get(key)?;
        index.owner(&value.index_value()?)
    }

    /// Nodes carrying `value` according to the secondary index on `key`.
    ///
    /// `None` when no such index exists.
    pub fn lookup(&self, key: &PropertyIndexKey, value: &PropertyValue) -> Option<Vec<NodeId>> {
        let index = self.indices.get(key)?;
        Some(
            value
                .index_value()
                .map(|v| index.get(&v))
                .unwrap_or_default(),
        )
    }

    /// Update every index touched by a property change on `node_id`.
    ///
    /// All uniqueness constraints are checked before anything is modified, so
    /// on `Err` the indexes are unchanged.
    pub fn on_property_set(
        &mut self,
        labels: &HashSet<Label>,
        property: &str,
        old: Option<&PropertyValue>,
        new: Option<&PropertyValue>,
        node_id: NodeId,
    ) -> Result<(), UniqueConflict> {
        let new_value = new.and_then(PropertyValue::index_value);
        let old_value = old.and_then(PropertyValue::index_value);

        if let Some(value) = &new_value {
            for label in labels {
                let key = PropertyIndexKey::new(label.clone(), property);
                if let Some(owner) = self.unique.get(&key).and_then(|idx| idx.owner(value)) {
                    if owner != node_id {
                        return Err(UniqueConflict { key, owner });
                    }
                }
            }
        }

        for label in labels {
            let key = PropertyIndexKey::new(label.clone(), property);
            if let Some(index) = self.unique.get_mut(&key) {
                if let Some(old) = &old_value {
                    index.release(old, node_id);
                }
                if let Some(new) = &new_value {
                    // Checked above; cannot conflict.
                    let _ = index.claim(new.clone(), node_id);
                }
            }
            if let Some(index) = self.indices.get_mut(&key) {
                if let Some(old) = &old_value {
                    index.remove(old, node_id);
                }
                if let Some(new) = &new_value {
                    index.insert(new.clone(), node_id);
                }
            }
        }
        Ok(())
    }

    /// Drop every index entry of a node that is being removed
    pub fn on_node_removed(&mut self, labels: &HashSet<Label>, properties: &PropertyMap, node_id: NodeId) {
        for (property, value) in properties {
            // Removing can never conflict.
            let _ = self.on_property_set(labels, property, Some(value), None, node_id);
        }
    }

    /// Declared uniqueness constraints, sorted
    pub fn unique_constraints(&self) -> Vec<&PropertyIndexKey> {
        let mut keys: Vec<_> = self.unique.keys().collect();
        keys.sort();
        keys
    }

    /// Declared secondary indexes, sorted
    pub fn indexes(&self) -> Vec<&PropertyIndexKey> {
        let mut keys: Vec<_> = self.indices.keys().collect();
        keys.sort();
        keys
    }
}
