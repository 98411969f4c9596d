//! Append-only backing stores for the audit chain.
//!
//! The file store keeps one JSON entry per line plus a small checkpoint file
//! holding the next index and last hash, so a restarted writer resumes
//! without reusing either. The checkpoint is written atomically (temp file +
//! rename) after every append; if it is ever missing or stale the store
//! falls back to scanning the log tail.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::AuditEntry;
use crate::error::Result;

/// Writer resume point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index the next entry will take.
    pub next_index: u64,
    /// Hash of the last written entry ([`GENESIS_HASH`] when empty).
    pub last_hash: String,
}

/// An append-only store the audit log writes through.
///
/// Implementations must be durable by the time `append` returns; the
/// fail-closed contract upstream depends on it.
pub trait AuditStore: Send + Sync {
    /// Durably append one entry.
    fn append(&self, entry: &AuditEntry) -> Result<()>;

    /// Read the whole chain in order.
    fn read_all(&self) -> Result<Vec<AuditEntry>>;

    /// Resume point, or `None` for an empty store.
    fn checkpoint(&self) -> Result<Option<Checkpoint>>;
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.entries
            .lock()
            .expect("audit store lock poisoned")
            .push(entry.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>> {
        Ok(self
            .entries
            .lock()
            .expect("audit store lock poisoned")
            .clone())
    }

    fn checkpoint(&self) -> Result<Option<Checkpoint>> {
        let entries = self.entries.lock().expect("audit store lock poisoned");
        Ok(entries.last().map(|last| Checkpoint {
            next_index: last.index + 1,
            last_hash: last.hash.clone(),
        }))
    }
}

// =============================================================================
// File Store
// =============================================================================

/// JSONL file store with a sidecar checkpoint.
pub struct FileAuditStore {
    log_path: PathBuf,
    checkpoint_path: PathBuf,
    // One writer at a time even if two logs share a store by mistake.
    write_lock: Mutex<()>,
}

impl FileAuditStore {
    /// Create a store writing to `log_path`, with the checkpoint alongside.
    pub fn new(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        let checkpoint_path = log_path.with_extension("checkpoint.json");
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            log_path,
            checkpoint_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the JSONL log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let tmp = self.checkpoint_path.with_extension("tmp");
        let payload = serde_json::to_vec(checkpoint)?;
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &self.checkpoint_path)?;
        Ok(())
    }

    fn scan_tail(&self) -> Result<Option<Checkpoint>> {
        if !self.log_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.log_path)?;
        let Some(last_line) = content.lines().rev().find(|l| !l.trim().is_empty()) else {
            return Ok(None);
        };
        let last: AuditEntry = serde_json::from_str(last_line)?;
        Ok(Some(Checkpoint {
            next_index: last.index + 1,
            last_hash: last.hash,
        }))
    }
}

impl AuditStore for FileAuditStore {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let _guard = self.write_lock.lock().expect("audit write lock poisoned");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.sync_data()?;

        self.write_checkpoint(&Checkpoint {
            next_index: entry.index + 1,
            last_hash: entry.hash.clone(),
        })
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.log_path)?;
        let mut entries = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    fn checkpoint(&self) -> Result<Option<Checkpoint>> {
        match std::fs::read(&self.checkpoint_path) {
            Ok(bytes) => {
                let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.scan_tail(),
            Err(e) => Err(e.into()),
        }
    }
}
