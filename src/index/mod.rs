//! Property Indexing module
//!
//! Uniqueness constraints (natural keys) and B-Tree secondary indexes.

pub mod manager;
pub mod property_index;

pub use manager::{IndexManager, PropertyIndexKey, UniqueConflict};
pub use property_index::{PropertyIndex, UniqueIndex};
