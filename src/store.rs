//! Boundary to the external storage engine.
//!
//! The lineage tracker never executes compactions, enumerates manifests,
//! or creates checkpoints itself -- the storage engine does. Everything
//! the tracker needs from the engine goes through the `TableStore` trait:
//! live-file listing, per-file key counts, the checkpoint primitive, and
//! a WAL flush. `DirStore` is a filesystem-backed implementation that
//! treats a directory of `.sst` files as a live set; it backs the
//! diagnostic binary and the integration tests.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DifferError, Result};
use crate::lineage::types::{FileId, TABLE_FILE_EXTENSION};

/// A live table file as reported by the engine's manifest.
///
/// Level is diagnostic only; the diff algorithm never looks at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFile {
    pub id: FileId,
    pub level: i32,
}

/// Storage-engine operations consumed by the lineage tracker.
///
/// Implementations must be callable from engine callback threads,
/// hence `Send + Sync`.
pub trait TableStore: Send + Sync {
    /// Flush the engine's write-ahead buffer to table files.
    fn flush_wal(&self) -> Result<()>;

    /// Create a hard-linked, consistent point-in-time copy of all live
    /// table files under `checkpoint_dir`. The directory must not exist.
    fn checkpoint(&self, checkpoint_dir: &Path) -> Result<()>;

    /// The engine's current write-sequence counter.
    fn latest_sequence_number(&self) -> u64;

    /// List the live table files of the database (or checkpoint) at `db_path`.
    fn live_files(&self, db_path: &Path) -> Result<Vec<LiveFile>>;

    /// Number of keys in a table file, looked up by trimmed id.
    ///
    /// Callers treat failure as advisory: the tracker logs a warning and
    /// records a key count of zero.
    fn key_count(&self, file: &FileId) -> Result<u64>;
}

/// Convenience: the live set of a snapshot as a `HashSet` of file ids.
pub fn live_file_set(store: &dyn TableStore, db_path: &Path) -> Result<HashSet<FileId>> {
    Ok(store
        .live_files(db_path)?
        .into_iter()
        .map(|f| f.id)
        .collect())
}

// ── DirStore ───────────────────────────────────────────────────────

/// Filesystem-backed `TableStore`.
///
/// Models the engine as a directory of `.sst` files:
/// - `live_files` lists `*.sst` entries (level is always 0)
/// - `checkpoint` hard-links every live file into the target directory
/// - `key_count` probes the backup directory first, then the db root,
///   and reads a sidecar `<file>.keys` count file when present
///
/// Good enough for the diagnostic binary and tests; a production host
/// wires the real engine behind `TableStore` instead.
pub struct DirStore {
    db_path: PathBuf,
    backup_path: Option<PathBuf>,
    sequence_number: std::sync::atomic::AtomicU64,
}

impl DirStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            backup_path: None,
            sequence_number: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Set the backup directory probed first by `key_count`.
    pub fn with_backup_dir(mut self, backup_path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(backup_path.into());
        self
    }

    /// Advance the simulated write-sequence counter.
    pub fn set_sequence_number(&self, seq: u64) {
        self.sequence_number
            .store(seq, std::sync::atomic::Ordering::SeqCst);
    }

    fn read_key_count_sidecar(dir: &Path, file: &FileId) -> Option<u64> {
        let sidecar = dir.join(format!("{}.keys", file));
        let contents = fs::read_to_string(sidecar).ok()?;
        contents.trim().parse().ok()
    }
}

impl TableStore for DirStore {
    fn flush_wal(&self) -> Result<()> {
        // Directory-backed stores have no write-ahead buffer.
        Ok(())
    }

    fn checkpoint(&self, checkpoint_dir: &Path) -> Result<()> {
        if checkpoint_dir.exists() {
            return Err(DifferError::Checkpoint(format!(
                "checkpoint directory already exists: {}",
                checkpoint_dir.display()
            )));
        }
        fs::create_dir_all(checkpoint_dir)?;
        for entry in fs::read_dir(&self.db_path)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("sst") {
                let target = checkpoint_dir.join(entry.file_name());
                fs::hard_link(&path, &target)?;
            }
        }
        Ok(())
    }

    fn latest_sequence_number(&self) -> u64 {
        self.sequence_number
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    fn live_files(&self, db_path: &Path) -> Result<Vec<LiveFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(db_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(TABLE_FILE_EXTENSION) {
                files.push(LiveFile {
                    id: FileId::new(stem),
                    level: 0,
                });
            }
        }
        Ok(files)
    }

    fn key_count(&self, file: &FileId) -> Result<u64> {
        // Probe the compaction backup dir first: inputs of past
        // compactions are gone from the live db dir.
        if let Some(backup) = &self.backup_path {
            if let Some(count) = Self::read_key_count_sidecar(backup, file) {
                return Ok(count);
            }
        }
        if let Some(count) = Self::read_key_count_sidecar(&self.db_path, file) {
            return Ok(count);
        }
        Err(DifferError::InvalidFileName(format!(
            "no key count available for '{}'",
            file
        )))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
