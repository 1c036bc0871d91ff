//! Graph backends the loader can write to
//!
//! [`GraphBackend`] is the seam between the loader and a graph store. The
//! shipped implementation is [`EmbeddedBackend`], an in-process store with
//! optional WAL durability.

use crate::graph::{GraphError, GraphStore, SchemaOp, SchemaOutcome, Transaction, TransactionStats};
use crate::persistence::{PersistenceError, PersistenceManager};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Backend is closed")]
    Closed,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Write interface of a graph store
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Declare a constraint or index, create-if-absent
    async fn apply_schema(&self, op: &SchemaOp) -> BackendResult<SchemaOutcome>;

    /// Commit a transaction atomically
    async fn commit(&self, tx: Transaction) -> BackendResult<TransactionStats>;

    /// Flush and release resources
    async fn close(&self) -> BackendResult<()>;
}

/// In-process graph store, optionally backed by a write-ahead log
pub struct EmbeddedBackend {
    store: Arc<RwLock<GraphStore>>,
    persistence: Option<PersistenceManager>,
}

impl EmbeddedBackend {
    /// Volatile store, lost when dropped
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(RwLock::new(GraphStore::new())),
            persistence: None,
        }
    }

    /// Durable store in `data_dir`, rebuilt from its WAL
    pub fn open(data_dir: impl AsRef<Path>) -> BackendResult<Self> {
        let persistence = PersistenceManager::new(data_dir)?;
        let mut store = GraphStore::new();
        persistence.recover(&mut store)?;
        info!(
            "Opened embedded graph at {:?}: {} nodes, {} edges",
            persistence.base_path(),
            store.node_count(),
            store.edge_count()
        );

        Ok(Self {
            store: Arc::new(RwLock::new(store)),
            persistence: Some(persistence),
        })
    }

    /// Shared handle to the underlying store
    pub fn store(&self) -> &Arc<RwLock<GraphStore>> {
        &self.store
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }
}

#[async_trait]
impl GraphBackend for EmbeddedBackend {
    async fn apply_schema(&self, op: &SchemaOp) -> BackendResult<SchemaOutcome> {
        let mut store = self.store.write().await;
        let outcome = store.apply_schema(op)?;
        if outcome == SchemaOutcome::Created {
            if let Some(persistence) = &self.persistence {
                persistence.log_schema(op)?;
            }
        }
        Ok(outcome)
    }

    async fn commit(&self, tx: Transaction) -> BackendResult<TransactionStats> {
        if tx.is_empty() {
            return Ok(TransactionStats::default());
        }

        // The write lock is held until the WAL append has completed.
        let mut store = self.store.write().await;
        let applied = store.apply_logged(&tx)?;

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.log_commit(tx.ops()) {
                warn!("WAL append failed, rolling back {} ops: {}", tx.len(), e);
                store.rollback(applied.undo);
                return Err(e.into());
            }
        }

        debug!("Committed transaction of {} ops", tx.len());
        Ok(applied.stats)
    }

    async fn close(&self) -> BackendResult<()> {
        if let Some(persistence) = &self.persistence {
            persistence.checkpoint()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Label, NodeKey, PropertyMap};
    use tempfile::TempDir;

    fn tx(nct_id: &str) -> Transaction {
        let mut tx = Transaction::new();
        tx.merge_node(NodeKey::new("Trial", "nct_id", nct_id), PropertyMap::new());
        tx
    }

    #[tokio::test]
    async fn test_in_memory_commit() {
        let backend = EmbeddedBackend::in_memory();
        assert!(!backend.is_persistent());

        let stats = backend.commit(tx("NCT1")).await.unwrap();
        assert_eq!(stats.nodes_created, 1);
        assert_eq!(backend.commit(Transaction::new()).await.unwrap(), TransactionStats::default());
        assert_eq!(backend.store().read().await.node_count(), 1);
    }

    #[tokio::test]
    async fn test_persistent_backend_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let backend = EmbeddedBackend::open(dir.path()).unwrap();
            let op = SchemaOp::unique("Trial", "nct_id");
            assert_eq!(backend.apply_schema(&op).await.unwrap(), SchemaOutcome::Created);
            backend.commit(tx("NCT1")).await.unwrap();
            backend.commit(tx("NCT2")).await.unwrap();
            backend.close().await.unwrap();
        }

        let backend = EmbeddedBackend::open(dir.path()).unwrap();
        let op = SchemaOp::unique("Trial", "nct_id");
        assert_eq!(backend.apply_schema(&op).await.unwrap(), SchemaOutcome::AlreadyExists);

        let store = backend.store().read().await;
        assert_eq!(store.node_count(), 2);
        assert!(store
            .find_node(&Label::new("Trial"), "nct_id", &"NCT2".into())
            .is_some());
    }

    #[tokio::test]
    async fn test_wal_failure_rolls_back_commit() {
        let dir = TempDir::new().unwrap();
        let backend = EmbeddedBackend::open(dir.path()).unwrap();

        // The first WAL file cannot be created while a directory holds its name
        let blocked = dir.path().join("wal").join(format!("wal-{:016x}.log", 1));
        std::fs::create_dir(&blocked).unwrap();

        let err = backend.commit(tx("NCT1")).await.unwrap_err();
        assert!(matches!(err, BackendError::Persistence(_)));
        {
            let store = backend.store().read().await;
            assert_eq!(store.node_count(), 0);
            assert!(store
                .find_node(&Label::new("Trial"), "nct_id", &"NCT1".into())
                .is_none());
        }

        std::fs::remove_dir(&blocked).unwrap();
        backend.commit(tx("NCT1")).await.unwrap();
        backend.close().await.unwrap();
        drop(backend);

        let reopened = EmbeddedBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.store().read().await.node_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_is_not_logged() {
        let dir = TempDir::new().unwrap();
        {
            let backend = EmbeddedBackend::open(dir.path()).unwrap();
            backend.commit(tx("NCT1")).await.unwrap();
            assert!(backend.commit(tx("")).await.is_err());
        }

        let backend = EmbeddedBackend::open(dir.path()).unwrap();
        assert_eq!(backend.store().read().await.node_count(), 1);
    }
}
