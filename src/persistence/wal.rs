//! Write-Ahead Log (WAL) implementation
//!
//! Every committed transaction and schema declaration is appended as a
//! length-prefixed bincode record carrying a sequence number and checksum.
//! Files are named `wal-{first_sequence:016x}.log` and replayed in name order.

use crate::graph::{SchemaOp, UpsertOp};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// WAL errors
#[derive(Error, Debug)]
pub enum WalError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Corruption detected
    #[error("WAL corruption detected at sequence {0}")]
    Corruption(u64),

    /// Entry could not be applied during replay
    #[error("Invalid log entry: {0}")]
    InvalidEntry(String),
}

pub type WalResult<T> = Result<T, WalError>;

/// Write-Ahead Log entry types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    /// Constraint or index declaration
    Schema(SchemaOp),
    /// One committed transaction
    Commit { ops: Vec<UpsertOp> },
    /// Checkpoint marker
    Checkpoint { sequence: u64, timestamp: i64 },
}

/// WAL record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalRecord {
    /// Sequence number (monotonically increasing)
    sequence: u64,
    /// Entry data
    entry: WalEntry,
    /// Checksum over the serialized entry
    checksum: u32,
}

impl WalRecord {
    fn new(sequence: u64, entry: WalEntry) -> WalResult<Self> {
        let checksum = checksum(&bincode::serialize(&entry)?);
        Ok(Self {
            sequence,
            entry,
            checksum,
        })
    }

    fn verify_checksum(&self) -> bool {
        bincode::serialize(&self.entry)
            .map(|bytes| checksum(&bytes) == self.checksum)
            .unwrap_or(false)
    }
}

/// Rotate-xor checksum over the serialized entry
fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0x811c_9dc5u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b))
}

/// Write-Ahead Log manager
pub struct Wal {
    /// Path to WAL directory
    path: PathBuf,
    /// Current WAL file
    current_file: Option<BufWriter<File>>,
    /// Bytes of complete records in the current file
    current_len: u64,
    /// Last sequence number handed out
    sequence: u64,
}

impl Wal {
    /// Open (or create) the WAL in `path`
    pub fn new(path: impl AsRef<Path>) -> WalResult<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let mut wal = Self {
            path,
            current_file: None,
            current_len: 0,
            sequence: 0,
        };
        wal.sequence = wal.replay(0, |_| Ok(()))?;

        info!("Initializing WAL at {:?}, sequence: {}", wal.path, wal.sequence);
        Ok(wal)
    }

    /// Last sequence number written
    pub fn current_sequence(&self) -> u64 {
        self.sequence
    }

    /// Append an entry, returning its sequence number.
    ///
    /// The record is handed to the OS before this returns; [`Wal::flush`]
    /// makes it durable. A failed append still consumes its sequence number,
    /// so the next append starts a new file instead of writing after the
    /// broken record.
    pub fn append(&mut self, entry: WalEntry) -> WalResult<u64> {
        let sequence = self.sequence + 1;
        let data = bincode::serialize(&WalRecord::new(sequence, entry)?)?;

        if self.current_file.is_none() {
            if let Err(e) = self.open_new_file(sequence) {
                self.sequence = sequence;
                return Err(e);
            }
        }

        if let Some(ref mut file) = self.current_file {
            let written = file
                .write_all(&(data.len() as u32).to_le_bytes())
                .and_then(|_| file.write_all(&data))
                .and_then(|_| file.flush());
            if let Err(e) = written {
                warn!("WAL append of sequence {} failed: {}", sequence, e);
                self.discard_partial_record();
                self.sequence = sequence;
                return Err(e.into());
            }
            self.current_len += 4 + data.len() as u64;
        }

        self.sequence = sequence;
        Ok(sequence)
    }

    /// Force flush the WAL
    pub fn flush(&mut self) -> WalResult<()> {
        if let Some(ref mut file) = self.current_file {
            file.flush()?;
            file.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Replay every record with `sequence >= from_sequence`.
    ///
    /// A record cut short at the end of a file (crash mid-append) ends that
    /// file's replay. Returns the last sequence seen.
    pub fn replay<F>(&self, from_sequence: u64, mut callback: F) -> WalResult<u64>
    where
        F: FnMut(&WalEntry) -> WalResult<()>,
    {
        debug!("Replaying WAL from sequence {}", from_sequence);

        let mut replayed = 0u64;
        let mut last_sequence = 0u64;

        for file_path in self.get_wal_files()? {
            let mut reader = BufReader::new(File::open(&file_path)?);
            let mut buf = Vec::new();

            loop {
                let mut len_bytes = [0u8; 4];
                match reader.read_exact(&mut len_bytes) {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e.into()),
                }

                buf.resize(u32::from_le_bytes(len_bytes) as usize, 0);
                match reader.read_exact(&mut buf) {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        warn!("Truncated WAL record at end of {:?}", file_path);
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }

                let record: WalRecord = bincode::deserialize(&buf)?;
                if !record.verify_checksum() {
                    warn!("WAL corruption detected at sequence {}", record.sequence);
                    return Err(WalError::Corruption(record.sequence));
                }

                last_sequence = last_sequence.max(record.sequence);
                if record.sequence < from_sequence {
                    continue;
                }

                callback(&record.entry)?;
                replayed += 1;
            }
        }

        debug!("Replayed {} WAL entries, last sequence: {}", replayed, last_sequence);
        Ok(last_sequence)
    }

    /// Append a checkpoint marker and start a fresh file
    pub fn checkpoint(&mut self) -> WalResult<u64> {
        let sequence = self.sequence;
        info!("Creating WAL checkpoint at sequence {}", sequence);

        self.append(WalEntry::Checkpoint {
            sequence,
            timestamp: chrono::Utc::now().timestamp(),
        })?;
        self.flush()?;
        self.current_file = None;
        self.current_len = 0;
        Ok(sequence)
    }

    /// Close the current file, cutting it back to its last complete record
    fn discard_partial_record(&mut self) {
        if let Some(writer) = self.current_file.take() {
            // Unflushed bytes belong to the failed record; drop them unwritten.
            let (file, _) = writer.into_parts();
            if let Err(e) = file.set_len(self.current_len) {
                warn!("Could not trim partial WAL record: {}", e);
            }
        }
        self.current_len = 0;
    }

    /// Start `wal-{first_sequence}.log`.
    ///
    /// A file with that name can only exist if an earlier append of
    /// `first_sequence` failed, so it holds no complete record and is emptied.
    fn open_new_file(&mut self, first_sequence: u64) -> WalResult<()> {
        let file_path = self.path.join(format!("wal-{:016x}.log", first_sequence));
        if file_path.exists() {
            warn!("Discarding incomplete WAL file {:?}", file_path);
        }
        debug!("Opening new WAL file: {:?}", file_path);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(file_path)?;
        self.current_file = Some(BufWriter::new(file));
        self.current_len = 0;
        Ok(())
    }

    /// All WAL files in sequence order
    fn get_wal_files(&self) -> WalResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.path)?
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map_or(false, |name| name.starts_with("wal-") && name.ends_with(".log"))
            })
            .map(|entry| entry.path())
            .collect();
        files.sort();
        Ok(files)
    }
}
