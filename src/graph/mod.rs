//! Embedded property graph
//!
//! This module implements the property graph the loader writes into:
//! - Nodes with labels and properties, identified by natural key
//! - Directed, typed edges with properties, at most one per (type, source, target)
//! - Unique constraints and secondary indexes declared through [`SchemaOp`]
//! - Atomic upsert transactions with an undo log

pub mod edge;
pub mod node;
pub mod property;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod types;

// Re-export main types
pub use edge::Edge;
pub use node::Node;
pub use property::{IndexValue, PropertyMap, PropertyValue};
pub use schema::{SchemaOp, SchemaOutcome};
pub use store::{GraphError, GraphResult, GraphStore};
pub use transaction::{NodeKey, Transaction, TransactionStats, UpsertOp};
pub use types::{EdgeId, EdgeType, Label, NodeId};
