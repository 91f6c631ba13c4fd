//! Integration tests: end-to-end snapshot diff scenarios through the
//! tracker, with the storage engine stubbed behind `MockStore`.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{ids, MockStore};
use sstdiff::error::DifferError;
use sstdiff::{FileId, LineageTracker, TrackerConfig};

fn setup(dir: &TempDir) -> (Arc<MockStore>, LineageTracker) {
    let store = Arc::new(MockStore::new());
    let config = TrackerConfig::new(
        dir.path().join("compaction-log"),
        dir.path().join("sst-backup"),
    );
    let tracker = LineageTracker::new(config, store.clone() as Arc<dyn sstdiff::TableStore>)
        .unwrap();
    (store, tracker)
}

#[test]
fn worked_example_diff_b_to_a() {
    // Snapshot A (generation 100) over {f1, f2, f3}; compact {f1, f2}
    // into {f4}; snapshot B (generation 150) over {f3, f4}.
    // diff(B, A) must be exactly {f4}.
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);

    store.set_live(&["f1", "f2", "f3"]);
    store.set_sequence_number(100);
    let snap_a = tracker.take_snapshot(&dir.path().join("cp_a")).unwrap();
    assert_eq!(snap_a.generation, 100);

    tracker
        .compaction_completed(&ids(&["f1", "f2"]), &ids(&["f4"]), 150, None)
        .unwrap();
    store.set_live(&["f3", "f4"]);
    store.set_sequence_number(150);
    let snap_b = tracker.take_snapshot(&dir.path().join("cp_b")).unwrap();
    assert_eq!(snap_b.generation, 150);

    let diff = tracker.diff(&snap_b, &snap_a).unwrap();
    assert_eq!(diff, vec![FileId::new("f4")]);

    // f3 is live in both; f1/f2 are never reached because f4
    // classifies on the generation check.
    let detailed = tracker.diff_detailed(&snap_b, &snap_a).unwrap();
    assert!(detailed.same.contains(&FileId::new("f3")));
    assert!(!detailed.same.contains(&FileId::new("f1")));
}

#[test]
fn diff_of_snapshot_with_itself_is_empty() {
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);

    store.set_live(&["f1", "f2"]);
    store.set_sequence_number(100);
    let snap = tracker.take_snapshot(&dir.path().join("cp")).unwrap();

    assert!(tracker.diff(&snap, &snap).unwrap().is_empty());
}

#[test]
fn diff_rejects_reversed_snapshot_order() {
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);

    store.set_sequence_number(100);
    let older = tracker.take_snapshot(&dir.path().join("cp_old")).unwrap();
    store.set_sequence_number(200);
    let newer = tracker.take_snapshot(&dir.path().join("cp_new")).unwrap();

    let err = tracker.diff(&older, &newer).unwrap_err();
    assert!(matches!(err, DifferError::SnapshotOrder { src: 100, dest: 200 }));
}

#[test]
fn unchanged_live_set_diffs_empty_across_generations() {
    // Generations advance but the live set is identical: nothing differs.
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);

    store.set_live(&["f1", "f2", "f3"]);
    store.set_sequence_number(100);
    let s1 = tracker.take_snapshot(&dir.path().join("cp1")).unwrap();
    store.set_sequence_number(250);
    let s2 = tracker.take_snapshot(&dir.path().join("cp2")).unwrap();

    assert!(tracker.diff(&s2, &s1).unwrap().is_empty());
}

#[test]
fn fresh_flush_output_is_different() {
    // A file that appears in src's live set with no recorded ancestry
    // (flushed, never compacted) is conservatively different.
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);

    store.set_live(&["f1"]);
    store.set_sequence_number(100);
    let s1 = tracker.take_snapshot(&dir.path().join("cp1")).unwrap();

    store.set_live(&["f1", "flushed"]);
    store.set_sequence_number(200);
    let s2 = tracker.take_snapshot(&dir.path().join("cp2")).unwrap();

    assert_eq!(tracker.diff(&s2, &s1).unwrap(), vec![FileId::new("flushed")]);
}

#[test]
fn multi_round_compaction_chain() {
    // Two compaction rounds between the snapshots: {a, b} -> {m} in
    // round one, {m, c} -> {z} in round two. The walk from z descends
    // the chain; every node carries a generation <= dest's, so the
    // chain classifies different at z itself.
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);

    store.set_live(&["a", "b", "c"]);
    store.set_sequence_number(100);
    let s1 = tracker.take_snapshot(&dir.path().join("cp1")).unwrap();

    tracker
        .compaction_completed(&ids(&["a", "b"]), &ids(&["m"]), 120, None)
        .unwrap();
    tracker
        .compaction_completed(&ids(&["m", "c"]), &ids(&["z"]), 140, Some("LevelL0FilesNum"))
        .unwrap();

    store.set_live(&["z"]);
    store.set_sequence_number(150);
    let s2 = tracker.take_snapshot(&dir.path().join("cp2")).unwrap();

    assert_eq!(tracker.diff(&s2, &s1).unwrap(), vec![FileId::new("z")]);
}

#[test]
fn key_count_failure_does_not_affect_diff() {
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);
    store.fail_key_counts();

    store.set_live(&["f1", "f2"]);
    store.set_sequence_number(100);
    let s1 = tracker.take_snapshot(&dir.path().join("cp1")).unwrap();

    tracker
        .compaction_completed(&ids(&["f1", "f2"]), &ids(&["f3"]), 150, None)
        .unwrap();
    store.set_live(&["f3"]);
    store.set_sequence_number(150);
    let s2 = tracker.take_snapshot(&dir.path().join("cp2")).unwrap();

    // Topology is intact despite every key-count lookup failing.
    assert_eq!(tracker.diff(&s2, &s1).unwrap(), vec![FileId::new("f3")]);
}

#[test]
fn diff_all_compares_latest_against_older() {
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);

    store.set_live(&["f1"]);
    store.set_sequence_number(100);
    tracker.take_snapshot(&dir.path().join("cp1")).unwrap();

    store.set_live(&["f1", "f2"]);
    store.set_sequence_number(200);
    tracker.take_snapshot(&dir.path().join("cp2")).unwrap();

    let results = tracker.diff_all().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "snap-1");
    assert_eq!(results[0].1, vec![FileId::new("f2")]);
}

#[test]
fn metrics_track_operations() {
    let dir = TempDir::new().unwrap();
    let (store, tracker) = setup(&dir);

    store.set_sequence_number(100);
    let s1 = tracker.take_snapshot(&dir.path().join("cp1")).unwrap();
    tracker
        .compaction_completed(&ids(&["f1"]), &ids(&["f2"]), 120, None)
        .unwrap();
    store.set_sequence_number(150);
    let s2 = tracker.take_snapshot(&dir.path().join("cp2")).unwrap();
    tracker.diff(&s2, &s1).unwrap();

    let snap = tracker.metrics();
    assert_eq!(snap.snapshots_taken, 2);
    assert_eq!(snap.compactions_recorded, 1);
    assert_eq!(snap.diffs_computed, 1);
}
