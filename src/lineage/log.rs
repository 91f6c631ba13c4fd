//! Append-only, rotating compaction log.
//!
//! The durable source of truth for lineage: every compaction event and
//! every snapshot boundary is one line in the segment file that is
//! active at write time. A new segment is opened each time a snapshot
//! is taken; closed segments are immutable.
//!
//! Line format (UTF-8, one entry per line):
//!
//! ```text
//! # free-form comment
//! S 1234              <- snapshot marker: sequence number
//! C 000101,000102:000110    <- compaction: inputs ':' outputs
//! ```
//!
//! Segment files are named by the zero-left-padded sequence number at
//! rotation time plus `.log`, so lexicographic listing order equals
//! creation order.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{DifferError, Result};
use crate::lineage::types::FileId;

/// Marks a comment line.
pub const COMMENT_LINE_PREFIX: &str = "# ";

/// Marks a sequence-number (snapshot boundary) line.
pub const SEQNUM_LINE_PREFIX: &str = "S ";

/// Marks a compaction record line.
pub const ENTRY_LINE_PREFIX: &str = "C ";

/// Delimiter between the input file list and the output file list.
pub const INPUT_OUTPUT_DELIMITER: char = ':';

/// Segment file suffix.
pub const SEGMENT_SUFFIX: &str = ".log";

/// Zero-pad width for segment names. Covers u64::MAX so lexicographic
/// order of segment names equals numeric order of sequence numbers.
const SEQNUM_PAD_WIDTH: usize = 20;

/// Rotating append-only log store. Exclusive writer of the log
/// directory; the tracker holds it inside the same mutex as the DAG.
pub struct CompactionLogStore {
    log_dir: PathBuf,
    /// Currently open segment, if any. Appends fail until the first
    /// `open_segment` call.
    active: Option<ActiveSegment>,
}

struct ActiveSegment {
    path: PathBuf,
    file: File,
}

impl CompactionLogStore {
    /// Open a log store over `log_dir`, creating the directory if needed.
    /// No segment is active until `open_segment` is called.
    pub fn new(log_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        if log_dir.as_os_str().is_empty() {
            return Err(DifferError::LogDirNotSet);
        }
        fs::create_dir_all(&log_dir)?;
        Ok(Self {
            log_dir,
            active: None,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn active_segment_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Name of the segment file for a given sequence number.
    pub fn segment_file_name(sequence_number: u64) -> String {
        format!("{:0>width$}{}", sequence_number, SEGMENT_SUFFIX, width = SEQNUM_PAD_WIDTH)
    }

    // ── Rotation ────────────────────────────────────────────────────

    /// Close the previous segment (it becomes immutable) and open a new
    /// one named by `sequence_number`. Called once per snapshot.
    pub fn open_segment(&mut self, sequence_number: u64) -> Result<()> {
        let path = self.log_dir.join(Self::segment_file_name(sequence_number));
        if path.exists() {
            tracing::warn!("compaction log segment exists, appending: {}", path.display());
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        // Dropping the previous ActiveSegment closes its handle.
        self.active = Some(ActiveSegment { path, file });
        Ok(())
    }

    // ── Appends ─────────────────────────────────────────────────────

    /// Append one line and flush it to durable storage before returning.
    /// Losing a compaction record silently would corrupt every future
    /// diff, so durability wins over throughput here.
    fn append_line(&mut self, line: &str) -> Result<()> {
        let segment = self.active.as_mut().ok_or(DifferError::NoActiveSegment)?;
        segment.file.write_all(line.as_bytes())?;
        segment.file.write_all(b"\n")?;
        segment.file.flush()?;
        segment.file.sync_all()?;
        Ok(())
    }

    /// Write a snapshot boundary marker. Establishes the generation
    /// attributed to subsequently logged compactions during replay.
    pub fn append_snapshot_marker(&mut self, sequence_number: u64) -> Result<()> {
        self.append_line(&format!("{}{}", SEQNUM_LINE_PREFIX, sequence_number))
    }

    /// Write one compaction record, optionally preceded by a comment
    /// line carrying the engine's compaction reason.
    pub fn append_compaction(
        &mut self,
        inputs: &[FileId],
        outputs: &[FileId],
        reason: Option<&str>,
    ) -> Result<()> {
        if let Some(reason) = reason {
            self.append_line(&format!("{}{}", COMMENT_LINE_PREFIX, reason))?;
        }
        let mut line = String::from(ENTRY_LINE_PREFIX);
        join_file_ids(&mut line, inputs);
        line.push(INPUT_OUTPUT_DELIMITER);
        join_file_ids(&mut line, outputs);
        self.append_line(&line)
    }

    // ── Read-side helpers ───────────────────────────────────────────

    /// Value of the newest snapshot marker across all segments, or None
    /// when no marker was ever written. Scans segments newest-first and
    /// stops at the first one containing a parseable marker.
    pub fn last_marker_generation(&self) -> Result<Option<u64>> {
        for path in self.segment_paths()?.iter().rev() {
            let contents = fs::read_to_string(path)?;
            let marker = contents
                .lines()
                .filter_map(|l| l.strip_prefix(SEQNUM_LINE_PREFIX))
                .filter_map(|rest| rest.trim().parse::<u64>().ok())
                .last();
            if marker.is_some() {
                return Ok(marker);
            }
        }
        Ok(None)
    }

    // ── Listing ─────────────────────────────────────────────────────

    /// All segment files in the log directory, ascending by name
    /// (= ascending by sequence number, thanks to the padding).
    pub fn segment_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.log_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_lowercase().ends_with(SEGMENT_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn join_file_ids(buf: &mut String, files: &[FileId]) {
    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        buf.push_str(file.as_str());
    }
}

// ── Tests ──────────────────────────────────────────────────────────
