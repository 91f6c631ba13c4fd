//! Operation counters for the lineage tracker.
//!
//! Lightweight, thread-safe, std-atomics only. One instance per tracker;
//! callers grab a point-in-time `MetricsSnapshot` for reporting. Counters
//! never reset for the lifetime of the tracker.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counter set. All increments are lock-free; `snapshot()`
/// is a consistent-enough read for diagnostics (counters are
/// independent, no cross-counter invariant is promised).
#[derive(Debug, Default)]
pub struct Metrics {
    /// Compaction events recorded through the live listener path.
    compactions_recorded: AtomicU64,
    /// Snapshots taken (checkpoint + marker + segment rotation).
    snapshots_taken: AtomicU64,
    /// Diff computations answered.
    diffs_computed: AtomicU64,
    /// Log segment files parsed during replay.
    segments_replayed: AtomicU64,
    /// Corrupt log lines skipped during replay.
    corrupt_lines_skipped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_compactions_recorded(&self) {
        self.compactions_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_snapshots_taken(&self) {
        self.snapshots_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_diffs_computed(&self) {
        self.diffs_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_segments_replayed(&self) {
        self.segments_replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_corrupt_lines(&self) {
        self.corrupt_lines_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            compactions_recorded: self.compactions_recorded.load(Ordering::Relaxed),
            snapshots_taken: self.snapshots_taken.load(Ordering::Relaxed),
            diffs_computed: self.diffs_computed.load(Ordering::Relaxed),
            segments_replayed: self.segments_replayed.load(Ordering::Relaxed),
            corrupt_lines_skipped: self.corrupt_lines_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data copy of the counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub compactions_recorded: u64,
    pub snapshots_taken: u64,
    pub diffs_computed: u64,
    pub segments_replayed: u64,
    pub corrupt_lines_skipped: u64,
}
