//! Log replay: rebuilds the in-memory DAG from compaction log segments.
//!
//! Parsing is line-oriented. The only carried state is the generation
//! context: a sequence-number marker line sets the generation attributed
//! to every subsequent compaction record until the next marker, the same
//! way a WAL checkpoints implicit state.
//!
//! Corrupt lines are skipped with a warning rather than aborting the
//! replay -- one bad line must not make all prior history unusable.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::lineage::dag::CompactionDag;
use crate::lineage::log::{
    CompactionLogStore, ENTRY_LINE_PREFIX, INPUT_OUTPUT_DELIMITER, SEQNUM_LINE_PREFIX,
};
use crate::lineage::types::FileId;
use crate::metrics::Metrics;
use crate::store::TableStore;

/// Result of a bounded load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Every requested file id has a node table entry.
    Complete,
    /// All segments were exhausted and these ids are still unknown.
    /// Not an error: they are presumed to be freshly flushed table
    /// files that never went through a compaction and so legitimately
    /// have no ancestry.
    Partial(HashSet<FileId>),
}

/// Replays compaction log segments into a `CompactionDag`.
///
/// Remembers which segment files it has already parsed so an
/// incremental `load_until_complete` never re-reads a segment
/// (`apply_compaction` is idempotent, so this is an I/O optimization,
/// not a correctness requirement).
pub struct LogReplayer {
    /// Generation context carried from the last seen `S ` marker.
    current_generation: u64,
    /// Segment files already parsed by this replayer.
    replayed: HashSet<PathBuf>,
}

impl LogReplayer {
    pub fn new() -> Self {
        Self {
            current_generation: 0,
            replayed: HashSet::new(),
        }
    }

    /// Number of segment files parsed so far.
    pub fn segments_replayed(&self) -> usize {
        self.replayed.len()
    }

    // ── Line parsing ────────────────────────────────────────────────

    fn apply_line(
        &mut self,
        line: &str,
        dag: &mut CompactionDag,
        store: Option<&dyn TableStore>,
        metrics: &Metrics,
    ) {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        if let Some(rest) = line.strip_prefix(SEQNUM_LINE_PREFIX) {
            match rest.trim().parse::<u64>() {
                Ok(seq) => self.current_generation = seq,
                Err(_) => {
                    tracing::warn!("skipping corrupt sequence marker line: '{}'", line);
                    metrics.inc_corrupt_lines();
                }
            }
            return;
        }
        if let Some(rest) = line.strip_prefix(ENTRY_LINE_PREFIX) {
            let Some((input_part, output_part)) = rest.split_once(INPUT_OUTPUT_DELIMITER) else {
                tracing::warn!("skipping corrupt compaction record line: '{}'", line);
                metrics.inc_corrupt_lines();
                return;
            };
            let inputs = split_file_list(input_part);
            let outputs = split_file_list(output_part);
            if inputs.is_empty() || outputs.is_empty() {
                tracing::warn!("skipping compaction record with empty side: '{}'", line);
                metrics.inc_corrupt_lines();
                return;
            }
            let snapshot_id = format!("gen-{}", self.current_generation);
            dag.apply_compaction(&inputs, &outputs, self.current_generation, &snapshot_id, store);
            return;
        }
        tracing::warn!("skipping unrecognized compaction log line: '{}'", line);
        metrics.inc_corrupt_lines();
    }

    /// Parse one segment file into the DAG. No-op if this replayer has
    /// already parsed it.
    pub fn replay_segment(
        &mut self,
        path: &Path,
        dag: &mut CompactionDag,
        store: Option<&dyn TableStore>,
        metrics: &Metrics,
    ) -> Result<()> {
        if self.replayed.contains(path) {
            return Ok(());
        }
        tracing::debug!("replaying compaction log segment: {}", path.display());
        let contents = fs::read_to_string(path)?;
        for line in contents.lines() {
            self.apply_line(line, dag, store, metrics);
        }
        self.replayed.insert(path.to_path_buf());
        metrics.inc_segments_replayed();
        Ok(())
    }

    // ── Bounded and full loads ──────────────────────────────────────

    /// Replay segments in ascending order until every id in `wanted`
    /// has a node table entry, or the segments run out.
    pub fn load_until_complete(
        &mut self,
        log: &CompactionLogStore,
        dag: &mut CompactionDag,
        store: Option<&dyn TableStore>,
        metrics: &Metrics,
        wanted: &HashSet<FileId>,
    ) -> Result<LoadOutcome> {
        let mut missing = dag.missing_from(wanted.iter());
        if missing.is_empty() {
            return Ok(LoadOutcome::Complete);
        }

        for path in log.segment_paths()? {
            self.replay_segment(&path, dag, store, metrics)?;
            missing.retain(|f| !dag.contains(f));
            if missing.is_empty() {
                return Ok(LoadOutcome::Complete);
            }
        }

        tracing::warn!(
            "{} file(s) not found in any compaction log segment; \
             assuming they were flushed directly and never compacted",
            missing.len()
        );
        Ok(LoadOutcome::Partial(missing))
    }

    /// Replay every segment not yet parsed. Used at startup to pre-warm
    /// the DAG, trading startup latency for first-query latency.
    ///
    /// The generation context must not be reset here: a marker lands at
    /// the tail of the segment active when the snapshot was taken, so
    /// records at the head of the next segment depend on context carried
    /// across the boundary. Segments are parsed at most once and in
    /// ascending order, which keeps the carried context correct across
    /// any mix of bounded and full loads.
    pub fn load_all(
        &mut self,
        log: &CompactionLogStore,
        dag: &mut CompactionDag,
        store: Option<&dyn TableStore>,
        metrics: &Metrics,
    ) -> Result<()> {
        for path in log.segment_paths()? {
            self.replay_segment(&path, dag, store, metrics)?;
        }
        Ok(())
    }
}

impl Default for LogReplayer {
    fn default() -> Self {
        Self::new()
    }
}

fn split_file_list(part: &str) -> Vec<FileId> {
    part.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(FileId::new)
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_segment(log: &mut CompactionLogStore, seq: u64, records: &[(&[&str], &[&str])]) {
        log.open_segment(seq).unwrap();
        log.append_snapshot_marker(seq).unwrap();
        for (inputs, outputs) in records {
            let inputs: Vec<FileId> = inputs.iter().map(|s| FileId::new(*s)).collect();
            let outputs: Vec<FileId> = outputs.iter().map(|s| FileId::new(*s)).collect();
            log.append_compaction(&inputs, &outputs, None).unwrap();
        }
    }

    #[test]
    fn test_load_all_rebuilds_dag() {
        let dir = TempDir::new().unwrap();
        let mut log = CompactionLogStore::new(dir.path()).unwrap();
        write_segment(&mut log, 100, &[(&["f1", "f2"], &["f4"])]);
        write_segment(&mut log, 150, &[(&["f4", "f3"], &["f5"])]);

        let mut dag = CompactionDag::new();
        let metrics = Metrics::new();
        let mut replayer = LogReplayer::new();
        replayer.load_all(&log, &mut dag, None, &metrics).unwrap();

        assert_eq!(dag.node_count(), 5);
        assert_eq!(dag.edge_count(), 4);
        // Generation context comes from the marker preceding each record.
        assert_eq!(dag.get(&FileId::new("f4")).unwrap().snapshot_generation, 100);
        assert_eq!(dag.get(&FileId::new("f5")).unwrap().snapshot_generation, 150);
    }

    #[test]
    fn test_load_until_complete_stops_early() {
        let dir = TempDir::new().unwrap();
        let mut log = CompactionLogStore::new(dir.path()).unwrap();
        write_segment(&mut log, 100, &[(&["f1", "f2"], &["f4"])]);
        write_segment(&mut log, 150, &[(&["f4"], &["f5"])]);
        write_segment(&mut log, 200, &[(&["f5"], &["f6"])]);

        let mut dag = CompactionDag::new();
        let metrics = Metrics::new();
        let mut replayer = LogReplayer::new();

        let wanted: HashSet<FileId> = [FileId::new("f4")].into_iter().collect();
        let outcome = replayer
            .load_until_complete(&log, &mut dag, None, &metrics, &wanted)
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Complete);
        // f4 appears in the first segment; the rest were not read.
        assert_eq!(replayer.segments_replayed(), 1);
        assert!(!dag.contains(&FileId::new("f6")));
    }

    #[test]
    fn test_load_until_complete_does_not_reread_segments() {
        let dir = TempDir::new().unwrap();
        let mut log = CompactionLogStore::new(dir.path()).unwrap();
        write_segment(&mut log, 100, &[(&["f1", "f2"], &["f4"])]);
        write_segment(&mut log, 150, &[(&["f3"], &["f5"])]);

        let mut dag = CompactionDag::new();
        let metrics = Metrics::new();
        let mut replayer = LogReplayer::new();

        let wanted: HashSet<FileId> = [FileId::new("f4")].into_iter().collect();
        replayer
            .load_until_complete(&log, &mut dag, None, &metrics, &wanted)
            .unwrap();
        assert_eq!(replayer.segments_replayed(), 1);

        // A later load that needs the second segment must not re-open
        // the first one.
        let wanted: HashSet<FileId> = [FileId::new("f5")].into_iter().collect();
        let outcome = replayer
            .load_until_complete(&log, &mut dag, None, &metrics, &wanted)
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Complete);
        assert_eq!(replayer.segments_replayed(), 2);
        assert_eq!(metrics.snapshot().segments_replayed, 2);
    }

    #[test]
    fn test_load_until_complete_partial() {
        let dir = TempDir::new().unwrap();
        let mut log = CompactionLogStore::new(dir.path()).unwrap();
        write_segment(&mut log, 100, &[(&["f1"], &["f2"])]);

        let mut dag = CompactionDag::new();
        let metrics = Metrics::new();
        let mut replayer = LogReplayer::new();

        let wanted: HashSet<FileId> =
            [FileId::new("f2"), FileId::new("flushed")].into_iter().collect();
        let outcome = replayer
            .load_until_complete(&log, &mut dag, None, &metrics, &wanted)
            .unwrap();
        match outcome {
            LoadOutcome::Partial(missing) => {
                assert_eq!(missing.len(), 1);
                assert!(missing.contains(&FileId::new("flushed")));
            }
            LoadOutcome::Complete => panic!("expected partial outcome"),
        }
    }

    #[test]
    fn test_bounded_then_full_load_keeps_generation_context() {
        // Markers land at the tail of the segment that was active when
        // the snapshot was taken, so records at the head of the next
        // segment depend on context carried across the boundary. That
        // context must survive a bounded load followed by a full load.
        let dir = TempDir::new().unwrap();
        let mut log = CompactionLogStore::new(dir.path()).unwrap();
        log.open_segment(0).unwrap();
        log.append_snapshot_marker(100).unwrap();
        log.open_segment(100).unwrap();
        log.append_compaction(
            &[FileId::new("f1"), FileId::new("f2")],
            &[FileId::new("f4")],
            None,
        )
        .unwrap();
        log.append_snapshot_marker(150).unwrap();
        log.open_segment(150).unwrap();
        log.append_compaction(
            &[FileId::new("f4"), FileId::new("f3")],
            &[FileId::new("f5")],
            None,
        )
        .unwrap();

        let mut dag = CompactionDag::new();
        let metrics = Metrics::new();
        let mut replayer = LogReplayer::new();

        let wanted: HashSet<FileId> = [FileId::new("f4")].into_iter().collect();
        replayer
            .load_until_complete(&log, &mut dag, None, &metrics, &wanted)
            .unwrap();
        assert_eq!(replayer.segments_replayed(), 2);

        replayer.load_all(&log, &mut dag, None, &metrics).unwrap();
        assert_eq!(replayer.segments_replayed(), 3);
        assert_eq!(dag.get(&FileId::new("f4")).unwrap().snapshot_generation, 100);
        assert_eq!(dag.get(&FileId::new("f5")).unwrap().snapshot_generation, 150);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let seg = dir.path().join("00000000000000000100.log");
        std::fs::write(
            &seg,
            "S 100\n\
             C f1,f2:f4\n\
             C missing-delimiter\n\
             S not-a-number\n\
             garbage line\n\
             C f4:f5\n",
        )
        .unwrap();

        let log = CompactionLogStore::new(dir.path()).unwrap();
        let mut dag = CompactionDag::new();
        let metrics = Metrics::new();
        let mut replayer = LogReplayer::new();
        replayer.load_all(&log, &mut dag, None, &metrics).unwrap();

        // Good records before and after the corruption both applied.
        assert!(dag.contains(&FileId::new("f4")));
        assert!(dag.contains(&FileId::new("f5")));
        assert_eq!(dag.node_count(), 4);
        assert_eq!(metrics.snapshot().corrupt_lines_skipped, 3);
    }
}
