//! trialgraph
//!
//! Transform-and-load engine that moves clinical-study records into a
//! property graph, enriching free-text drug descriptions with a controlled
//! vocabulary of administration route and dosage form.
//!
//! # Architecture
//!
//! - [`rules`]: ordered keyword rule table (YAML or built-in)
//! - [`transform`]: text inference and record cleaning
//! - [`loader`]: schema bootstrap and one atomic upsert transaction per batch
//! - [`graph`] / [`persistence`]: embedded property graph with a write-ahead log
//! - [`pipeline`]: source -> cleaner -> batcher -> loader
//!
//! ## Example Usage
//!
//! ```rust
//! use trialgraph::{EmbeddedBackend, Pipeline, PipelineConfig, RawStudy, RecordCleaner};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let raw: RawStudy = serde_json::from_str(r#"{
//!     "nct_id": "NCT00000102",
//!     "drugs": [{"name": "Drug X", "description": "Oral tablet administered daily"}]
//! }"#).unwrap();
//!
//! let pipeline = Pipeline::new(
//!     PipelineConfig::default(),
//!     RecordCleaner::default(),
//!     EmbeddedBackend::in_memory(),
//! );
//! let summary = pipeline.run(vec![Ok(raw)].into_iter()).await.unwrap();
//! assert_eq!(summary.nodes_created, 2);
//! # });
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod graph;
pub mod index;
pub mod loader;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod rules;
pub mod source;
pub mod stats;
pub mod transform;

// Re-export main types for convenience
pub use config::{ConfigError, MalformedPolicy, PipelineConfig};
pub use graph::{
    Edge, EdgeId, EdgeType, GraphError, GraphResult, GraphStore, Label, Node, NodeId, NodeKey,
    PropertyMap, PropertyValue, SchemaOp, Transaction, TransactionStats, UpsertOp,
};
pub use loader::{
    BackendError, BatchResult, EmbeddedBackend, GraphBackend, GraphLoader, LoadError, LoadResult,
};
pub use model::{CanonicalCondition, CanonicalDrug, CanonicalSponsor, CanonicalStudy, RawDrug, RawSponsor, RawStudy};
pub use persistence::{PersistenceError, PersistenceManager, PersistenceResult, Wal, WalEntry, WalError, WalResult};
pub use pipeline::{Pipeline, PipelineError, PipelineResult, RunSummary};
pub use rules::{Category, Rule, RuleError, RuleTable};
pub use source::{JsonFileSource, RecordSource, SourceError, SourceResult};
pub use stats::{DescriptionCoverage, GraphSummary, InferenceCoverage};
pub use transform::{CleanError, Inference, InferenceEngine, RecordCleaner, UNKNOWN};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
