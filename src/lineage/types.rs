//! Core record types for the compaction lineage subsystem.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DifferError, Result};

/// Table file extension reported by the storage engine. Lower case;
/// trimmed from file ids before logging to save log space.
pub const TABLE_FILE_EXTENSION: &str = ".sst";

/// Identifier of a table file: the file name with directory and
/// extension stripped. Globally unique for the lifetime of a database
/// (the engine never reuses table file numbers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Trim an engine-reported path (`/some/dir/000123.sst`) down to the
    /// bare id (`000123`). The engine always reports absolute paths with
    /// the table extension; anything else is a malformed report.
    pub fn from_table_path(path: &str) -> Result<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let stem = name
            .strip_suffix(TABLE_FILE_EXTENSION)
            .ok_or_else(|| DifferError::InvalidFileName(path.to_string()))?;
        if stem.is_empty() {
            return Err(DifferError::InvalidFileName(path.to_string()));
        }
        Ok(Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One vertex of the compaction DAG: a table file ever observed, either
/// as a compaction output or (for files that predate tracking) as a
/// compaction input seen for the first time.
///
/// Immutable after creation except `cumulative_key_count`, which is a
/// scratch field for the reverse-traversal report.
#[derive(Debug, Clone)]
pub struct CompactionNode {
    /// Trimmed table file id.
    pub file_id: FileId,
    /// Id of the most recent snapshot that existed when this file was created.
    pub snapshot_id: String,
    /// Engine sequence number at file creation; the "age" used by the
    /// diff walk to compare against a destination snapshot.
    pub snapshot_generation: u64,
    /// Keys in the file, from engine metadata. Advisory; zero when the
    /// lookup failed.
    pub total_key_count: u64,
    /// Scratch accumulator for `report::traverse_reverse`. Not used by diff.
    pub cumulative_key_count: u64,
}

impl CompactionNode {
    pub fn new(file_id: FileId, snapshot_id: String, key_count: u64, generation: u64) -> Self {
        Self {
            file_id,
            snapshot_id,
            snapshot_generation: generation,
            total_key_count: key_count,
            cumulative_key_count: 0,
        }
    }
}

/// A named point-in-time checkpoint of the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Checkpoint directory (a hard-linked copy of the live set).
    pub path: PathBuf,
    /// Host-assigned snapshot id.
    pub id: String,
    /// Engine sequence number at creation time.
    pub generation: u64,
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>, id: impl Into<String>, generation: u64) -> Self {
        Self {
            path: path.into(),
            id: id.into(),
            generation,
        }
    }
}

/// Tracker configuration. Plain data, supplied by the host service.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Compaction log directory: rotating segments + the persisted
    /// snapshot registry live here.
    pub log_dir: PathBuf,
    /// Directory receiving hard-link backups of compaction input files
    /// before the engine deletes them.
    pub backup_dir: PathBuf,
    /// Bounded ring size of the snapshot registry; the oldest record is
    /// overwritten when full.
    pub max_snapshots: usize,
}

impl TrackerConfig {
    pub fn new(log_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            backup_dir: backup_dir.into(),
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
        }
    }

    pub fn with_max_snapshots(mut self, max_snapshots: usize) -> Self {
        self.max_snapshots = max_snapshots;
        self
    }
}

pub const DEFAULT_MAX_SNAPSHOTS: usize = 100;

/// Append the table extension back onto a trimmed id, for disk probes.
pub fn table_file_name(id: &FileId) -> String {
    format!("{}{}", id, TABLE_FILE_EXTENSION)
}

/// Resolve a trimmed id to an on-disk path, probing `dirs` in order.
pub fn locate_table_file(id: &FileId, dirs: &[&Path]) -> Option<PathBuf> {
    let name = table_file_name(id);
    dirs.iter()
        .map(|d| d.join(&name))
        .find(|candidate| candidate.exists())
}

// ── Tests ──────────────────────────────────────────────────────────
