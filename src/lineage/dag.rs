//! Compaction lineage DAG over table files.
//!
//! One arena of `CompactionNode` records plus index-based adjacency in
//! both directions. Forward edges point output -> input (towards older
//! ancestry); reverse edges mirror them. Keeping a single edge set with
//! two adjacency indexes means an edge can never exist in one direction
//! but not the other.
//!
//! NOT Send+Sync on its own -- the tracker serializes all access behind
//! one mutex together with the log store and snapshot registry.

use std::collections::{HashMap, HashSet};

use crate::lineage::types::{CompactionNode, FileId};
use crate::store::TableStore;

/// Traversal direction through the lineage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Output -> input: from a file towards the older files it replaced.
    Forward,
    /// Input -> output: from a file towards the newer files that replaced it.
    Reverse,
}

/// Arena-backed compaction DAG + node table.
///
/// Node indices are stable for the lifetime of the arena; nodes are
/// never removed (the DAG is derived state, discarded wholesale on
/// restart and rebuilt from the log).
pub struct CompactionDag {
    nodes: Vec<CompactionNode>,
    /// Node table: trimmed file id -> arena index.
    by_file: HashMap<FileId, usize>,
    /// Forward adjacency: fwd[o] lists the inputs file o was compacted from.
    fwd: Vec<Vec<usize>>,
    /// Reverse adjacency: rev[i] lists the outputs file i was compacted into.
    rev: Vec<Vec<usize>>,
    /// Edge dedup set, keyed (output_idx, input_idx).
    edges: HashSet<(usize, usize)>,
}

impl CompactionDag {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            by_file: HashMap::new(),
            fwd: Vec::new(),
            rev: Vec::new(),
            edges: HashSet::new(),
        }
    }

    // ── Node table ──────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, file: &FileId) -> bool {
        self.by_file.contains_key(file)
    }

    pub fn index_of(&self, file: &FileId) -> Option<usize> {
        self.by_file.get(file).copied()
    }

    pub fn node(&self, idx: usize) -> &CompactionNode {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut CompactionNode {
        &mut self.nodes[idx]
    }

    pub fn get(&self, file: &FileId) -> Option<&CompactionNode> {
        self.index_of(file).map(|i| &self.nodes[i])
    }

    /// Iterate nodes with their arena indices, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CompactionNode)> {
        self.nodes.iter().enumerate()
    }

    /// Adjacency of `idx` in the given direction.
    pub fn successors(&self, idx: usize, direction: Direction) -> &[usize] {
        match direction {
            Direction::Forward => &self.fwd[idx],
            Direction::Reverse => &self.rev[idx],
        }
    }

    /// True iff every id in `files` has a node table entry.
    pub fn is_fully_loaded<'a>(&self, files: impl IntoIterator<Item = &'a FileId>) -> bool {
        files.into_iter().all(|f| self.contains(f))
    }

    /// Subset of `files` with no node table entry yet.
    pub fn missing_from<'a>(
        &self,
        files: impl IntoIterator<Item = &'a FileId>,
    ) -> HashSet<FileId> {
        files
            .into_iter()
            .filter(|f| !self.contains(f))
            .cloned()
            .collect()
    }

    // ── Ingestion ───────────────────────────────────────────────────

    /// Insert a node unless one already exists for `file`. Returns the
    /// arena index either way.
    fn insert_node(
        &mut self,
        file: &FileId,
        snapshot_id: &str,
        generation: u64,
        store: Option<&dyn TableStore>,
    ) -> usize {
        if let Some(idx) = self.index_of(file) {
            return idx;
        }
        let key_count = match store.map(|s| s.key_count(file)) {
            Some(Ok(count)) => count,
            Some(Err(e)) => {
                tracing::warn!("key count lookup failed for '{}': {}", file, e);
                0
            }
            None => 0,
        };
        let idx = self.nodes.len();
        self.nodes.push(CompactionNode::new(
            file.clone(),
            snapshot_id.to_string(),
            key_count,
            generation,
        ));
        self.by_file.insert(file.clone(), idx);
        self.fwd.push(Vec::new());
        self.rev.push(Vec::new());
        idx
    }

    /// Add the directed edge output -> input to both adjacency indexes.
    /// Self-loops are refused; duplicate edges collapse.
    fn add_edge(&mut self, output: usize, input: usize) {
        if output == input {
            return;
        }
        if self.edges.insert((output, input)) {
            self.fwd[output].push(input);
            self.rev[input].push(output);
        }
    }

    /// Apply one compaction event to the graph.
    ///
    /// Creates missing nodes for outputs first, then inputs (inputs with
    /// no prior node are files that predate tracking), then draws every
    /// (output, input) edge. Idempotent: node and edge insertion are
    /// keyed set unions, so replaying a record already applied is a
    /// no-op.
    pub fn apply_compaction(
        &mut self,
        inputs: &[FileId],
        outputs: &[FileId],
        generation: u64,
        snapshot_id: &str,
        store: Option<&dyn TableStore>,
    ) {
        tracing::debug!(
            "apply compaction: {} inputs -> {} outputs at generation {}",
            inputs.len(),
            outputs.len(),
            generation
        );

        for outfile in outputs {
            let out_idx = self.insert_node(outfile, snapshot_id, generation, store);
            for infile in inputs {
                let in_idx = self.insert_node(infile, snapshot_id, generation, store);
                self.add_edge(out_idx, in_idx);
            }
        }
    }
}

impl Default for CompactionDag {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
