//! Error types for the lineage tracker

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DifferError>;

#[derive(Error, Debug)]
pub enum DifferError {
    #[error("Compaction log directory is not set")]
    LogDirNotSet,

    #[error("No compaction log segment is open; open a segment before appending")]
    NoActiveSegment,

    #[error("Invalid table file name: {0}")]
    InvalidFileName(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Snapshot ordering violated: src generation {src} < dest generation {dest}")]
    SnapshotOrder { src: u64, dest: u64 },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Backup link error for '{file}': {source}")]
    BackupLink {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
