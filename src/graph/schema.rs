//! Schema operations understood by the store

use super::types::Label;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A constraint or index declaration on `(label, property)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaOp {
    /// Every node with `label` holds a distinct `property` value
    UniqueConstraint { label: Label, property: String },
    /// Secondary lookup index on `label.property`
    Index { label: Label, property: String },
}

impl SchemaOp {
    pub fn unique(label: impl Into<Label>, property: impl Into<String>) -> Self {
        SchemaOp::UniqueConstraint {
            label: label.into(),
            property: property.into(),
        }
    }

    pub fn index(label: impl Into<Label>, property: impl Into<String>) -> Self {
        SchemaOp::Index {
            label: label.into(),
            property: property.into(),
        }
    }

    pub fn label(&self) -> &Label {
        match self {
            SchemaOp::UniqueConstraint { label, .. } | SchemaOp::Index { label, .. } => label,
        }
    }

    pub fn property(&self) -> &str {
        match self {
            SchemaOp::UniqueConstraint { property, .. } | SchemaOp::Index { property, .. } => property,
        }
    }
}

impl fmt::Display for SchemaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaOp::UniqueConstraint { label, property } => write!(f, "UNIQUE {}.{}", label, property),
            SchemaOp::Index { label, property } => write!(f, "INDEX {}.{}", label, property),
        }
    }
}

/// Result of a create-if-absent schema declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaOutcome {
    Created,
    AlreadyExists,
}
