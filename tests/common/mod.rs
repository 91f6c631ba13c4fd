//! Shared test double for the storage-engine boundary.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sstdiff::error::{DifferError, Result};
use sstdiff::store::{LiveFile, TableStore};
use sstdiff::FileId;

/// In-memory `TableStore`: a settable live set, a sequence counter,
/// per-file key counts, and checkpoints that freeze the live set under
/// a path (standing in for the engine's hard-link checkpoint).
pub struct MockStore {
    state: Mutex<MockState>,
}

struct MockState {
    sequence_number: u64,
    live: HashSet<FileId>,
    checkpoints: HashMap<PathBuf, HashSet<FileId>>,
    key_counts: HashMap<FileId, u64>,
    fail_key_counts: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                sequence_number: 0,
                live: HashSet::new(),
                checkpoints: HashMap::new(),
                key_counts: HashMap::new(),
                fail_key_counts: false,
            }),
        }
    }

    pub fn set_sequence_number(&self, seq: u64) {
        self.state.lock().unwrap().sequence_number = seq;
    }

    pub fn set_live(&self, files: &[&str]) {
        self.state.lock().unwrap().live = files.iter().map(|f| FileId::new(*f)).collect();
    }

    pub fn set_key_count(&self, file: &str, count: u64) {
        self.state
            .lock()
            .unwrap()
            .key_counts
            .insert(FileId::new(file), count);
    }

    /// Make every key-count lookup fail, exercising the best-effort path.
    pub fn fail_key_counts(&self) {
        self.state.lock().unwrap().fail_key_counts = true;
    }

    /// Freeze the current live set under `path`, as `checkpoint` would.
    pub fn checkpoint_as(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        let live = state.live.clone();
        state.checkpoints.insert(path.to_path_buf(), live);
    }
}

impl TableStore for MockStore {
    fn flush_wal(&self) -> Result<()> {
        Ok(())
    }

    fn checkpoint(&self, checkpoint_dir: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let live = state.live.clone();
        state.checkpoints.insert(checkpoint_dir.to_path_buf(), live);
        Ok(())
    }

    fn latest_sequence_number(&self) -> u64 {
        self.state.lock().unwrap().sequence_number
    }

    fn live_files(&self, db_path: &Path) -> Result<Vec<LiveFile>> {
        let state = self.state.lock().unwrap();
        let set = state
            .checkpoints
            .get(db_path)
            .unwrap_or(&state.live)
            .clone();
        Ok(set.into_iter().map(|id| LiveFile { id, level: 0 }).collect())
    }

    fn key_count(&self, file: &FileId) -> Result<u64> {
        let state = self.state.lock().unwrap();
        if state.fail_key_counts {
            return Err(DifferError::InvalidFileName(format!(
                "key count unavailable for '{}'",
                file
            )));
        }
        Ok(state.key_counts.get(file).copied().unwrap_or(0))
    }
}

pub fn ids(names: &[&str]) -> Vec<FileId> {
    names.iter().map(|n| FileId::new(*n)).collect()
}
