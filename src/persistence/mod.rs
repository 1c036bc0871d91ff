//! Persistence layer for the embedded graph store
//!
//! The graph itself lives in memory; durability comes from the write-ahead
//! log. Opening a data directory replays it into a fresh [`GraphStore`].

pub mod wal;

pub use wal::{Wal, WalEntry, WalError, WalResult};

use crate::graph::{GraphError, GraphStore, SchemaOp, Transaction, UpsertOp};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("Replay failed: {0}")]
    Replay(#[from] GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL lock poisoned")]
    Poisoned,
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// WAL-backed durability for one graph
pub struct PersistenceManager {
    /// Base path for all data
    base_path: PathBuf,
    /// Write-Ahead Log
    wal: Arc<Mutex<Wal>>,
}

impl PersistenceManager {
    /// Open the data directory, creating it if needed
    pub fn new(base_path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let wal_path = base_path.join("wal");
        std::fs::create_dir_all(&wal_path)?;

        info!("Initializing persistence manager at: {:?}", base_path);
        let wal = Wal::new(&wal_path)?;

        Ok(Self {
            base_path,
            wal: Arc::new(Mutex::new(wal)),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Rebuild `store` from the log. Returns the number of entries applied.
    pub fn recover(&self, store: &mut GraphStore) -> PersistenceResult<u64> {
        info!("Starting recovery from {:?}", self.base_path);
        let mut applied = 0u64;

        self.wal()?.replay(0, |entry| {
            match entry {
                WalEntry::Schema(op) => {
                    store
                        .apply_schema(op)
                        .map_err(|e| WalError::InvalidEntry(e.to_string()))?;
                }
                WalEntry::Commit { ops } => {
                    store
                        .apply_transaction(&Transaction::from(ops.clone()))
                        .map_err(|e| WalError::InvalidEntry(e.to_string()))?;
                }
                WalEntry::Checkpoint { .. } => return Ok(()),
            }
            applied += 1;
            Ok(())
        })?;

        info!(
            "Recovered {} entries: {} nodes, {} edges",
            applied,
            store.node_count(),
            store.edge_count()
        );
        Ok(applied)
    }

    /// Durably record a schema declaration
    pub fn log_schema(&self, op: &SchemaOp) -> PersistenceResult<u64> {
        let mut wal = self.wal()?;
        let sequence = wal.append(WalEntry::Schema(op.clone()))?;
        wal.flush()?;
        Ok(sequence)
    }

    /// Durably record a committed transaction
    pub fn log_commit(&self, ops: &[UpsertOp]) -> PersistenceResult<u64> {
        let mut wal = self.wal()?;
        let sequence = wal.append(WalEntry::Commit { ops: ops.to_vec() })?;
        wal.flush()?;
        Ok(sequence)
    }

    /// Create a checkpoint
    pub fn checkpoint(&self) -> PersistenceResult<u64> {
        let sequence = self.wal()?.checkpoint()?;
        info!("Checkpoint created at sequence {}", sequence);
        Ok(sequence)
    }

    fn wal(&self) -> PersistenceResult<MutexGuard<'_, Wal>> {
        self.wal.lock().map_err(|_| PersistenceError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Label, NodeKey, PropertyMap};
    use tempfile::TempDir;

    fn trial_tx(nct_id: &str) -> Transaction {
        let mut tx = Transaction::new();
        tx.merge_node(NodeKey::new("Trial", "nct_id", nct_id), PropertyMap::new());
        tx
    }

    #[test]
    fn test_persistence_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path()).unwrap();
        assert!(temp_dir.path().join("wal").is_dir());
        assert_eq!(manager.base_path(), temp_dir.path());
    }

    #[test]
    fn test_recovery() {
        let temp_dir = TempDir::new().unwrap();

        {
            let manager = PersistenceManager::new(temp_dir.path()).unwrap();
            manager.log_schema(&SchemaOp::unique("Trial", "nct_id")).unwrap();
            for i in 1..=5 {
                manager.log_commit(trial_tx(&format!("NCT{}", i)).ops()).unwrap();
            }
            manager.checkpoint().unwrap();
        }

        let manager = PersistenceManager::new(temp_dir.path()).unwrap();
        let mut store = GraphStore::new();
        let applied = manager.recover(&mut store).unwrap();

        assert_eq!(applied, 6);
        assert_eq!(store.node_count(), 5);
        assert_eq!(store.indexes().unique_constraints().len(), 1);
        assert!(store
            .find_node(&Label::new("Trial"), "nct_id", &"NCT3".into())
            .is_some());
    }

    #[test]
    fn test_recovery_of_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::new(temp_dir.path()).unwrap();
        let mut store = GraphStore::new();
        assert_eq!(manager.recover(&mut store).unwrap(), 0);
        assert_eq!(store.node_count(), 0);
    }
}
