//! sstdiff: compaction-lineage DAG engine for LSM snapshot diffing.
//!
//! An LSM storage engine rewrites its immutable sorted-table files in
//! the background; this crate records which files replaced which
//! (the compaction lineage) in a rotating append-only log, mirrors it
//! as a two-direction DAG in memory, and uses the DAG to compute the
//! minimal set of table files that differ between two point-in-time
//! snapshots of the same database.
//!
//! The storage engine itself is an external collaborator behind the
//! [`store::TableStore`] trait: the tracker consumes its compaction
//! callbacks and read-only queries, and owns nothing of the engine.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use sstdiff::{DirStore, LineageTracker, TrackerConfig};
//!
//! # fn main() -> sstdiff::Result<()> {
//! let store = Arc::new(DirStore::new("/data/db"));
//! let config = TrackerConfig::new("/data/compaction-log", "/data/sst-backup");
//! let tracker = Arc::new(LineageTracker::new(config, store)?);
//!
//! // Install before the engine opens for writes.
//! let listener = tracker.listener();
//!
//! tracker.load_all_logs()?;
//! let snap_a = tracker.take_snapshot("/data/checkpoints/a".as_ref())?;
//! let snap_b = tracker.take_snapshot("/data/checkpoints/b".as_ref())?;
//! let changed = tracker.diff(&snap_b, &snap_a)?;
//! # let _ = (listener, changed);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lineage;
pub mod metrics;
pub mod store;

pub use error::{DifferError, Result};
pub use lineage::{
    CompactionDag, CompactionListener, CompactionNode, DiffResult, FileId, LineageTracker,
    Snapshot, TrackerConfig,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use store::{DirStore, LiveFile, TableStore};
