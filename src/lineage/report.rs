//! Diagnostic reports over the lineage DAG.
//!
//! Human-readable, non-contractual output: node table dumps, adjacency
//! dumps, and the bulk reverse traversal that accumulates key counts
//! from original files up through their compaction outputs. None of
//! this affects diff correctness.

use std::collections::VecDeque;
use std::fmt::Write;

use crate::lineage::dag::{CompactionDag, Direction};
use crate::lineage::types::FileId;

/// Node table dump, sorted by file id (case-insensitive).
pub fn dump_node_table(dag: &CompactionDag) -> String {
    let mut indices: Vec<usize> = (0..dag.node_count()).collect();
    indices.sort_by_key(|&i| dag.node(i).file_id.as_str().to_lowercase());

    let mut out = String::new();
    for idx in indices {
        let node = dag.node(idx);
        let _ = writeln!(
            out,
            "File '{}' snapshot '{}' generation {} total keys: {} cumulative keys: {}",
            node.file_id,
            node.snapshot_id,
            node.snapshot_generation,
            node.total_key_count,
            node.cumulative_key_count
        );
    }
    out
}

/// Adjacency dump of one graph direction, sorted by file id.
pub fn dump_graph(dag: &CompactionDag, direction: Direction) -> String {
    let mut indices: Vec<usize> = (0..dag.node_count()).collect();
    indices.sort_by_key(|&i| dag.node(i).file_id.as_str().to_lowercase());

    let label = match direction {
        Direction::Forward => "fwd",
        Direction::Reverse => "rev",
    };
    let mut out = String::new();
    for idx in indices {
        let mut succ: Vec<&str> = dag
            .successors(idx, direction)
            .iter()
            .map(|&s| dag.node(s).file_id.as_str())
            .collect();
        succ.sort_unstable();
        let _ = writeln!(out, "{} '{}' -> [{}]", label, dag.node(idx).file_id, succ.join(", "));
    }
    out
}

/// Level-by-level expansion from one file in the given direction.
/// Returns None when the file has no node table entry.
pub fn dump_from(dag: &CompactionDag, file: &FileId, direction: Direction) -> Option<String> {
    let start = dag.index_of(file)?;
    let mut out = String::new();
    let _ = writeln!(out, "Expanding file: {}", file);

    let mut current_level = vec![start];
    let mut seen = vec![false; dag.node_count()];
    seen[start] = true;
    let mut level = 1;
    while !current_level.is_empty() {
        let mut names: Vec<&str> = Vec::new();
        let mut next_level = Vec::new();
        for &idx in &current_level {
            for &succ in dag.successors(idx, direction) {
                if !seen[succ] {
                    seen[succ] = true;
                    names.push(dag.node(succ).file_id.as_str());
                    next_level.push(succ);
                }
            }
        }
        if names.is_empty() {
            break;
        }
        names.sort_unstable();
        let _ = writeln!(out, "Level {}: {}", level, names.join(" "));
        level += 1;
        current_level = next_level;
    }
    Some(out)
}

/// Reverse bulk traversal: seed every sink (a file with no forward
/// successors, i.e. an original never-split file) with its own key
/// count, then propagate sums input -> output so each compaction
/// output accumulates the key counts of its entire ancestry.
///
/// Overwrites `cumulative_key_count` on every node; recomputed per call.
pub fn traverse_reverse(dag: &mut CompactionDag) {
    let n = dag.node_count();

    // Remaining unprocessed inputs per node = forward out-degree.
    let mut pending: Vec<usize> = (0..n)
        .map(|i| dag.successors(i, Direction::Forward).len())
        .collect();

    let mut queue: VecDeque<usize> = VecDeque::new();
    for idx in 0..n {
        let total = dag.node(idx).total_key_count;
        let node = dag.node_mut(idx);
        node.cumulative_key_count = 0;
        if pending[idx] == 0 {
            node.cumulative_key_count = total;
            queue.push_back(idx);
        }
    }

    // Kahn-style propagation along reverse edges. Generations are
    // non-increasing along forward edges, so this terminates with every
    // node processed exactly once.
    while let Some(idx) = queue.pop_front() {
        let cumulative = dag.node(idx).cumulative_key_count;
        let outputs: Vec<usize> = dag.successors(idx, Direction::Reverse).to_vec();
        for out_idx in outputs {
            dag.node_mut(out_idx).cumulative_key_count += cumulative;
            pending[out_idx] -= 1;
            if pending[out_idx] == 0 {
                queue.push_back(out_idx);
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
