//! Idempotent batch loader
//!
//! Turns canonical study records into one upsert [`Transaction`] per batch
//! and commits it through a [`GraphBackend`]. Every node is matched by its
//! natural key and every relationship by `(type, source key, target key)`,
//! with properties overwritten, so re-loading the same batch is a no-op on
//! the graph's shape and values.

pub mod backend;
pub mod cypher;
pub mod schema;

pub use backend::{BackendError, BackendResult, EmbeddedBackend, GraphBackend};
pub use schema::{trial_graph_schema, SchemaStatement};

use crate::graph::{NodeKey, PropertyMap, PropertyValue, SchemaOutcome, Transaction, TransactionStats};
use crate::model::CanonicalStudy;
use schema::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Schema bootstrap failed on {statement}: {source}")]
    SchemaBootstrap {
        statement: String,
        #[source]
        source: BackendError,
    },

    #[error("Batch {batch_index} failed to commit: {source}")]
    BatchCommit {
        batch_index: usize,
        #[source]
        source: BackendError,
    },

    #[error("Failed to close graph backend: {0}")]
    Close(#[source] BackendError),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Outcome of one committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub batch_index: usize,
    pub records: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub properties_set: usize,
}

impl BatchResult {
    fn from_stats(batch_index: usize, records: usize, stats: &TransactionStats) -> Self {
        Self {
            batch_index,
            records,
            nodes_created: stats.nodes_created,
            edges_created: stats.edges_created,
            properties_set: stats.properties_set,
        }
    }
}

/// Outcome of schema bootstrap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub created: usize,
    pub existing: usize,
}

/// Loader bound to one backend for the lifetime of a run
pub struct GraphLoader<B: GraphBackend> {
    backend: B,
}

impl<B: GraphBackend> GraphLoader<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Declare natural-key constraints and Trial indexes, create-if-absent.
    pub async fn bootstrap_schema(&self) -> LoadResult<SchemaReport> {
        let mut report = SchemaReport::default();
        for statement in trial_graph_schema() {
            debug!("{}", cypher::schema_statement(&statement));
            let outcome = self
                .backend
                .apply_schema(&statement.op)
                .await
                .map_err(|source| LoadError::SchemaBootstrap {
                    statement: statement.name.to_string(),
                    source,
                })?;
            match outcome {
                SchemaOutcome::Created => report.created += 1,
                SchemaOutcome::AlreadyExists => report.existing += 1,
            }
        }
        info!(
            "Schema ready: {} created, {} already present",
            report.created, report.existing
        );
        Ok(report)
    }

    /// Load `records` as a single atomic transaction
    pub async fn load_batch(&self, batch_index: usize, records: &[CanonicalStudy]) -> LoadResult<BatchResult> {
        if records.is_empty() {
            return Ok(BatchResult {
                batch_index,
                ..Default::default()
            });
        }

        let tx = build_transaction(records);
        debug!("Batch {}: {} records, {} upserts", batch_index, records.len(), tx.len());

        let stats = self
            .backend
            .commit(tx)
            .await
            .map_err(|source| LoadError::BatchCommit { batch_index, source })?;
        Ok(BatchResult::from_stats(batch_index, records.len(), &stats))
    }

    pub async fn close(&self) -> LoadResult<()> {
        self.backend.close().await.map_err(LoadError::Close)
    }
}

/// Upserts for a batch, in record order.
///
/// Per record: the Trial, then each Drug with its `STUDIED_IN` edge, each
/// Condition with `STUDIES_CONDITION`, each Organization with `SPONSORED_BY`.
pub fn build_transaction(records: &[CanonicalStudy]) -> Transaction {
    let mut tx = Transaction::new();

    for record in records {
        let trial = NodeKey::new(TRIAL, NCT_ID, record.nct_id.as_str());
        tx.merge_node(
            trial.clone(),
            props([
                ("title", record.title.as_str()),
                ("phase", record.phase.as_str()),
                ("status", record.status.as_str()),
            ]),
        );

        for drug in &record.drugs {
            let key = NodeKey::new(DRUG, NAME, drug.name.as_str());
            tx.merge_node(key.clone(), PropertyMap::new()).merge_edge(
                STUDIED_IN,
                key,
                trial.clone(),
                props([
                    ("route", drug.route.as_str()),
                    ("dosage_form", drug.dosage_form.as_str()),
                ]),
            );
        }

        for condition in &record.conditions {
            let key = NodeKey::new(CONDITION, NAME, condition.name.as_str());
            tx.merge_node(key.clone(), PropertyMap::new()).merge_edge(
                STUDIES_CONDITION,
                trial.clone(),
                key,
                PropertyMap::new(),
            );
        }

        for sponsor in &record.sponsors {
            let key = NodeKey::new(ORGANIZATION, NAME, sponsor.name.as_str());
            tx.merge_node(key.clone(), PropertyMap::new()).merge_edge(
                SPONSORED_BY,
                trial.clone(),
                key,
                props([("class", sponsor.class.as_str())]),
            );
        }
    }

    tx
}

fn props<const N: usize>(pairs: [(&str, &str); N]) -> PropertyMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), PropertyValue::from(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeType, Label, UpsertOp};
    use crate::model::{CanonicalCondition, CanonicalDrug, CanonicalSponsor};

    fn study(nct_id: &str, drug: &str) -> CanonicalStudy {
        CanonicalStudy {
            nct_id: nct_id.into(),
            title: "Study Of Drug X".into(),
            phase: "Phase3".into(),
            status: "Completed".into(),
            drugs: vec![CanonicalDrug {
                name: drug.into(),
                route: "Oral".into(),
                dosage_form: "Tablet".into(),
            }],
            conditions: vec![CanonicalCondition { name: "Condition Y".into() }],
            sponsors: vec![CanonicalSponsor {
                name: "Example Pharma Inc".into(),
                class: "INDUSTRY".into(),
            }],
        }
    }

    #[test]
    fn test_build_transaction_shape() {
        let tx = build_transaction(&[study("NCT1", "Drug X")]);
        assert_eq!(tx.len(), 7);

        match &tx.ops()[2] {
            UpsertOp::MergeEdge { edge_type, from, to, properties } => {
                assert_eq!(edge_type.as_str(), STUDIED_IN);
                assert_eq!(from.label.as_str(), DRUG);
                assert_eq!(to.label.as_str(), TRIAL);
                assert_eq!(properties["route"], PropertyValue::from("Oral"));
            }
            other => panic!("expected STUDIED_IN edge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let loader = GraphLoader::new(EmbeddedBackend::in_memory());
        let first = loader.bootstrap_schema().await.unwrap();
        let second = loader.bootstrap_schema().await.unwrap();

        assert_eq!(first, SchemaReport { created: 6, existing: 0 });
        assert_eq!(second, SchemaReport { created: 0, existing: 6 });
        let store = loader.backend().store().read().await;
        assert_eq!(store.indexes().unique_constraints().len(), 4);
        assert_eq!(store.indexes().indexes().len(), 2);
    }

    #[tokio::test]
    async fn test_reload_creates_nothing() {
        let loader = GraphLoader::new(EmbeddedBackend::in_memory());
        loader.bootstrap_schema().await.unwrap();
        let batch = vec![study("NCT1", "Drug X"), study("NCT2", "Drug X")];

        let first = loader.load_batch(0, &batch).await.unwrap();
        assert_eq!(first.records, 2);
        assert_eq!(first.nodes_created, 5);
        assert_eq!(first.edges_created, 6);

        let second = loader.load_batch(0, &batch).await.unwrap();
        assert_eq!(second.nodes_created, 0);
        assert_eq!(second.edges_created, 0);

        let store = loader.backend().store().read().await;
        assert_eq!(store.node_count(), 5);
        assert_eq!(store.get_edges_by_type(&EdgeType::new(STUDIED_IN)).len(), 2);
    }

    #[tokio::test]
    async fn test_bootstrap_over_duplicate_names_fails() {
        let loader = GraphLoader::new(EmbeddedBackend::in_memory());
        {
            let mut store = loader.backend().store().write().await;
            for _ in 0..2 {
                let mut props = PropertyMap::new();
                props.insert(NAME.to_string(), "Aspirin".into());
                store.create_node(DRUG, props).unwrap();
            }
        }

        let err = loader.bootstrap_schema().await.unwrap_err();
        match err {
            LoadError::SchemaBootstrap { statement, source } => {
                assert_eq!(statement, "drug_name");
                assert!(matches!(
                    source,
                    BackendError::Graph(crate::graph::GraphError::ExistingDuplicates { .. })
                ));
            }
            other => panic!("expected schema bootstrap error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let loader = GraphLoader::new(EmbeddedBackend::in_memory());
        let result = loader.load_batch(3, &[]).await.unwrap();
        assert_eq!(result, BatchResult { batch_index: 3, ..Default::default() });
    }

    #[tokio::test]
    async fn test_failing_batch_leaves_nothing_behind() {
        let loader = GraphLoader::new(EmbeddedBackend::in_memory());
        loader.bootstrap_schema().await.unwrap();

        let mut bad = study("NCT2", "Drug Z");
        bad.conditions.push(CanonicalCondition { name: String::new() });
        let err = loader
            .load_batch(4, &[study("NCT1", "Drug Y"), bad])
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::BatchCommit { batch_index: 4, .. }));
        let store = loader.backend().store().read().await;
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.edge_count(), 0);
        assert!(store
            .find_node(&Label::new(TRIAL), NCT_ID, &"NCT1".into())
            .is_none());
    }
}
