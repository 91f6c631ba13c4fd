//! Compaction lineage subsystem.
//!
//! Persistent, crash-recoverable DAG over the table files of an LSM
//! storage engine: the log is the durable truth, the in-memory DAG is
//! derived state rebuilt by replay, and the diff walk answers "what
//! changed between these two snapshots" without scanning the keyspace.

pub mod dag;
pub mod diff;
pub mod log;
pub mod replay;
pub mod report;
pub mod tracker;
pub mod types;

pub use dag::{CompactionDag, Direction};
pub use diff::{compute_diff, DiffResult};
pub use log::CompactionLogStore;
pub use replay::{LoadOutcome, LogReplayer};
pub use tracker::{CompactionListener, LineageTracker};
pub use types::{CompactionNode, FileId, Snapshot, TrackerConfig};
