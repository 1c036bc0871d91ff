//! Graph nodes

use super::property::{PropertyMap, PropertyValue};
use super::types::{Label, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A labelled node. The loader gives every node exactly one label
/// (`Trial`, `Drug`, `Condition` or `Organization`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub labels: HashSet<Label>,
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(id: NodeId, label: impl Into<Label>, properties: PropertyMap) -> Self {
        Node {
            id,
            labels: std::iter::once(label.into()).collect(),
            properties,
        }
    }

    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// Overwrite `key`, returning what was there before
    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}
