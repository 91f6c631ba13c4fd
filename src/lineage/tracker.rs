//! The lineage tracker: owner of the node table, both graph
//! directions, the active log segment, and the snapshot registry.
//!
//! All four move together under cross-structure invariants (a
//! compaction must atomically land in the log and in both adjacency
//! directions; a snapshot must append its marker and rotate the
//! segment as one step), so every logical operation takes one mutex
//! over the whole state. The operations are short and rare relative to
//! foreground engine traffic; coarse locking is the point, not a
//! shortcut.
//!
//! Inbound: storage-engine compaction callbacks, via `CompactionListener`.
//! Outbound: the compaction log (exclusive writer) and read-only
//! engine queries (live files, key counts) through `TableStore`.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{DifferError, Result};
use crate::lineage::dag::{CompactionDag, Direction};
use crate::lineage::diff::{compute_diff, DiffResult};
use crate::lineage::log::CompactionLogStore;
use crate::lineage::replay::{LoadOutcome, LogReplayer};
use crate::lineage::report;
use crate::lineage::types::{FileId, Snapshot, TrackerConfig};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::store::{live_file_set, TableStore};

/// File name of the persisted snapshot registry, kept inside the log
/// directory next to the segments.
const REGISTRY_FILE_NAME: &str = "snapshots.json";

/// Persisted registry shape.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    snapshot_counter: u64,
    snapshots: Vec<Snapshot>,
}

struct TrackerInner {
    dag: CompactionDag,
    log: CompactionLogStore,
    replayer: LogReplayer,
    /// Bounded ring of snapshots, oldest first. Oldest is dropped when
    /// the ring is full.
    snapshots: VecDeque<Snapshot>,
    /// Generation attributed to compactions recorded from now on: the
    /// sequence number of the last snapshot marker. Log replay
    /// reconstructs exactly this value from the `S ` lines, so live
    /// ingestion and reconstruction agree.
    current_generation: u64,
    /// Id of the most recent snapshot, attributed to new nodes.
    current_snapshot_id: String,
    snapshot_counter: u64,
}

/// Compaction lineage tracker. See module docs.
pub struct LineageTracker {
    inner: Mutex<TrackerInner>,
    store: Arc<dyn TableStore>,
    backup_dir: PathBuf,
    max_snapshots: usize,
    metrics: Metrics,
}

impl LineageTracker {
    /// Construct the tracker: create the log and backup directories,
    /// restore the persisted snapshot registry if present, and open the
    /// initial log segment at the engine's current sequence number.
    ///
    /// Must run before the engine is opened for writes, so that no
    /// compaction can complete without an active segment to land in.
    pub fn new(config: TrackerConfig, store: Arc<dyn TableStore>) -> Result<Self> {
        let log = CompactionLogStore::new(&config.log_dir)?;
        fs::create_dir_all(&config.backup_dir)?;

        let registry_path = config.log_dir.join(REGISTRY_FILE_NAME);
        let (snapshot_counter, snapshots) = match load_registry(&registry_path)? {
            Some(registry) => {
                let mut ring: VecDeque<Snapshot> = registry.snapshots.into();
                while ring.len() > config.max_snapshots {
                    ring.pop_front();
                }
                (registry.snapshot_counter, ring)
            }
            None => (0, VecDeque::new()),
        };

        let current_generation = match snapshots.back() {
            Some(snapshot) => snapshot.generation,
            // Registry lost or never written: recover the context from
            // the newest marker in the logs, so compactions recorded
            // from here on carry the same generation a replay of the
            // same logs would attribute.
            None => log.last_marker_generation()?.unwrap_or(0),
        };
        let current_snapshot_id = snapshots
            .back()
            .map(|s| s.id.clone())
            .unwrap_or_else(|| format!("gen-{}", current_generation));

        let mut inner = TrackerInner {
            dag: CompactionDag::new(),
            log,
            replayer: LogReplayer::new(),
            snapshots,
            current_generation,
            current_snapshot_id,
            snapshot_counter,
        };
        inner.log.open_segment(store.latest_sequence_number())?;

        Ok(Self {
            inner: Mutex::new(inner),
            store,
            backup_dir: config.backup_dir,
            max_snapshots: config.max_snapshots.max(1),
            metrics: Metrics::new(),
        })
    }

    /// Cloneable callback handle for wiring into the engine's
    /// compaction listener slot. Install before opening the engine for
    /// writes; a dropped notification permanently breaks ancestry for
    /// the files involved.
    pub fn listener(self: &Arc<Self>) -> CompactionListener {
        CompactionListener {
            tracker: Arc::clone(self),
        }
    }

    // ── Ingestion (engine callback path) ────────────────────────────

    /// Hard-link every compaction input file into the backup directory
    /// before the engine deletes it. Keeps input files readable for key
    /// counts and for consumers of diff results.
    pub fn backup_compaction_inputs(&self, input_paths: &[PathBuf]) -> Result<()> {
        if input_paths.is_empty() {
            tracing::warn!("compaction-begin callback with empty input list");
            return Ok(());
        }
        for path in input_paths {
            let Some(name) = path.file_name() else {
                return Err(DifferError::InvalidFileName(path.display().to_string()));
            };
            let link = self.backup_dir.join(name);
            match fs::hard_link(path, &link) {
                Ok(()) => tracing::debug!("backed up compaction input '{}'", path.display()),
                // A retried callback may have linked this file already.
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(DifferError::BackupLink {
                        file: path.display().to_string(),
                        source: e,
                    })
                }
            }
        }
        Ok(())
    }

    /// Record one completed compaction: append the record to the active
    /// log segment, then apply it to the DAG, as one exclusive step.
    ///
    /// `sequence_number` is the engine's counter at completion time and
    /// is used for tracing only; the node generation attributed is the
    /// last snapshot boundary, which is what log replay reconstructs
    /// (the worked diff semantics depend on the two agreeing).
    pub fn compaction_completed(
        &self,
        inputs: &[FileId],
        outputs: &[FileId],
        sequence_number: u64,
        reason: Option<&str>,
    ) -> Result<()> {
        if inputs.is_empty() {
            tracing::warn!("compaction-completed callback with empty input list");
            return Ok(());
        }
        let mut guard = self.lock_inner();
        tracing::debug!(
            "compaction at seq {} (attributed generation {}): {:?} -> {:?}",
            sequence_number,
            guard.current_generation,
            inputs,
            outputs
        );
        guard.log.append_compaction(inputs, outputs, reason)?;
        let generation = guard.current_generation;
        let snapshot_id = guard.current_snapshot_id.clone();
        guard
            .dag
            .apply_compaction(inputs, outputs, generation, &snapshot_id, Some(&*self.store));
        self.metrics.inc_compactions_recorded();
        Ok(())
    }

    // ── Snapshot lifecycle ──────────────────────────────────────────

    /// Take a snapshot: flush the engine's write-ahead buffer, create a
    /// checkpoint at `checkpoint_dir`, capture the sequence number as
    /// the new snapshot's generation, append the marker, and rotate to
    /// a new log segment.
    ///
    /// The whole sequence holds the tracker lock so a concurrent
    /// compaction callback observes the rotation as one step: anything
    /// completing after the checkpoint lands in the new segment and is
    /// attributed to the new generation.
    pub fn take_snapshot(&self, checkpoint_dir: &Path) -> Result<Snapshot> {
        let mut guard = self.lock_inner();

        self.store.flush_wal()?;
        self.store.checkpoint(checkpoint_dir)?;
        let generation = self.store.latest_sequence_number();

        guard.snapshot_counter += 1;
        let id = format!("snap-{}", guard.snapshot_counter);
        let snapshot = Snapshot::new(checkpoint_dir, id.clone(), generation);

        guard.log.append_snapshot_marker(generation)?;
        guard.log.open_segment(generation)?;
        guard.current_generation = generation;
        guard.current_snapshot_id = id;

        guard.snapshots.push_back(snapshot.clone());
        while guard.snapshots.len() > self.max_snapshots {
            let dropped = guard.snapshots.pop_front();
            if let Some(dropped) = dropped {
                tracing::debug!("snapshot ring full, dropping '{}'", dropped.id);
            }
        }
        self.persist_registry(&guard)?;
        self.metrics.inc_snapshots_taken();
        tracing::info!(
            "snapshot '{}' at generation {} ({})",
            snapshot.id,
            generation,
            checkpoint_dir.display()
        );
        Ok(snapshot)
    }

    /// Snapshots currently retained, oldest first.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.lock_inner().snapshots.iter().cloned().collect()
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.lock_inner().snapshots.back().cloned()
    }

    /// Find a retained snapshot by id.
    pub fn snapshot_by_id(&self, id: &str) -> Result<Snapshot> {
        self.lock_inner()
            .snapshots
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| DifferError::SnapshotNotFound(id.to_string()))
    }

    // ── Reconstruction ──────────────────────────────────────────────

    /// Replay every log segment into the DAG. Called once at startup to
    /// pre-warm; later diffs then skip segment reads entirely.
    pub fn load_all_logs(&self) -> Result<()> {
        let mut guard = self.lock_inner();
        let TrackerInner {
            dag, log, replayer, ..
        } = &mut *guard;
        replayer.load_all(log, dag, Some(&*self.store), &self.metrics)
    }

    // ── Diff ────────────────────────────────────────────────────────

    /// Table files present in `src` (the newer snapshot) that cannot be
    /// proven unchanged relative to `dest` (the older one), as a sorted
    /// list of trimmed file ids.
    pub fn diff(&self, src: &Snapshot, dest: &Snapshot) -> Result<Vec<FileId>> {
        Ok(self.diff_detailed(src, dest)?.different_sorted())
    }

    /// Like `diff`, but returns the full classification including the
    /// diagnostic `same` set.
    pub fn diff_detailed(&self, src: &Snapshot, dest: &Snapshot) -> Result<DiffResult> {
        if src.generation < dest.generation {
            return Err(DifferError::SnapshotOrder {
                src: src.generation,
                dest: dest.generation,
            });
        }

        let mut guard = self.lock_inner();
        let src_live = live_file_set(&*self.store, &src.path)?;
        let dest_live = live_file_set(&*self.store, &dest.path)?;

        // Bring the DAG up to "sufficient for this query". Partial is
        // fine: leftover ids are fresh flush outputs with no ancestry,
        // and the walk classifies them different, which is the
        // conservative answer.
        let mut wanted: HashSet<FileId> = src_live.iter().cloned().collect();
        wanted.extend(dest_live.iter().cloned());
        let TrackerInner {
            dag, log, replayer, ..
        } = &mut *guard;
        if let LoadOutcome::Partial(missing) =
            replayer.load_until_complete(log, dag, Some(&*self.store), &self.metrics, &wanted)?
        {
            tracing::debug!("{} live file(s) have no recorded ancestry", missing.len());
        }

        let result = compute_diff(dag, src.generation, &src_live, dest.generation, &dest_live);
        self.metrics.inc_diffs_computed();
        tracing::debug!(
            "diff '{}' -> '{}': {} different, {} same",
            src.id,
            dest.id,
            result.different.len(),
            result.same.len()
        );
        Ok(result)
    }

    /// Diff the latest snapshot against every older retained snapshot.
    /// Diagnostic convenience; results are (dest snapshot id, diff).
    pub fn diff_all(&self) -> Result<Vec<(String, Vec<FileId>)>> {
        let snapshots = self.snapshots();
        let Some(latest) = snapshots.last().cloned() else {
            return Ok(Vec::new());
        };
        let mut results = Vec::new();
        for dest in snapshots.iter().take(snapshots.len() - 1) {
            results.push((dest.id.clone(), self.diff(&latest, dest)?));
        }
        Ok(results)
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    pub fn dump_node_table(&self) -> String {
        report::dump_node_table(&self.lock_inner().dag)
    }

    /// Both adjacency directions, forward first.
    pub fn dump_graphs(&self) -> String {
        let guard = self.lock_inner();
        let mut out = report::dump_graph(&guard.dag, Direction::Forward);
        out.push_str(&report::dump_graph(&guard.dag, Direction::Reverse));
        out
    }

    pub fn dump_snapshots(&self) -> String {
        use std::fmt::Write;
        let guard = self.lock_inner();
        let mut out = String::new();
        for snapshot in &guard.snapshots {
            let _ = writeln!(
                out,
                "Snapshot '{}' generation {} path {}",
                snapshot.id,
                snapshot.generation,
                snapshot.path.display()
            );
        }
        out
    }

    /// Recompute the reverse cumulative-key traversal and dump the node
    /// table with the accumulated counts.
    pub fn cumulative_key_report(&self) -> String {
        let mut guard = self.lock_inner();
        report::traverse_reverse(&mut guard.dag);
        report::dump_node_table(&guard.dag)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ── Internals ───────────────────────────────────────────────────

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, TrackerInner> {
        // Inner state stays consistent even if a previous holder
        // panicked mid-append; replay-on-restart is the recovery story.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist_registry(&self, inner: &TrackerInner) -> Result<()> {
        let registry = RegistryFile {
            snapshot_counter: inner.snapshot_counter,
            snapshots: inner.snapshots.iter().cloned().collect(),
        };
        let path = inner.log.log_dir().join(REGISTRY_FILE_NAME);
        let json = serde_json::to_string_pretty(&registry)?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn load_registry(path: &Path) -> Result<Option<RegistryFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

// ── Listener ───────────────────────────────────────────────────────

/// Cloneable handle delivered to the storage engine's listener slot.
/// The engine invokes these callbacks from its own background
/// compaction threads; all serialization happens inside the tracker.
#[derive(Clone)]
pub struct CompactionListener {
    tracker: Arc<LineageTracker>,
}

impl CompactionListener {
    /// Engine is about to delete `input_paths`; back them up first.
    pub fn on_compaction_begin(&self, input_paths: &[PathBuf]) -> Result<()> {
        self.tracker.backup_compaction_inputs(input_paths)
    }

    /// A compaction finished. Paths are engine-reported absolute paths
    /// with the table extension; they are trimmed here.
    pub fn on_compaction_completed(
        &self,
        input_paths: &[String],
        output_paths: &[String],
        sequence_number: u64,
        reason: Option<&str>,
    ) -> Result<()> {
        let inputs = trim_paths(input_paths)?;
        let outputs = trim_paths(output_paths)?;
        self.tracker
            .compaction_completed(&inputs, &outputs, sequence_number, reason)
    }
}

fn trim_paths(paths: &[String]) -> Result<Vec<FileId>> {
    paths.iter().map(|p| FileId::from_table_path(p)).collect()
}
