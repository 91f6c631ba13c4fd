//! lineage-dump: offline diagnostics for a compaction log directory.
//!
//! Rebuilds the lineage DAG from the log segments (read-only, no
//! tracker state is touched) and prints human-readable reports.
//!
//! Usage:
//!   lineage-dump <log-dir>                      node table dump
//!   lineage-dump <log-dir> --graphs             + both adjacency directions
//!   lineage-dump <log-dir> --keys               cumulative key report
//!   lineage-dump <log-dir> --diff <src> <dest>  diff two registered snapshots by id

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context};

use sstdiff::lineage::report;
use sstdiff::lineage::{compute_diff, CompactionDag, CompactionLogStore, Direction, LogReplayer};
use sstdiff::store::live_file_set;
use sstdiff::{DirStore, FileId, Metrics, Snapshot};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(log_dir) = args.first() else {
        bail!("usage: lineage-dump <log-dir> [--graphs | --keys | --diff <src-id> <dest-id>]");
    };
    let log_dir = PathBuf::from(log_dir);

    let log = CompactionLogStore::new(&log_dir)?;
    let mut dag = CompactionDag::new();
    let metrics = Metrics::new();
    let mut replayer = LogReplayer::new();
    replayer.load_all(&log, &mut dag, None, &metrics)?;
    eprintln!(
        "replayed {} segment(s): {} nodes, {} edges",
        metrics.snapshot().segments_replayed,
        dag.node_count(),
        dag.edge_count()
    );

    match args.get(1).map(String::as_str) {
        None => {
            print!("{}", report::dump_node_table(&dag));
        }
        Some("--graphs") => {
            print!("{}", report::dump_node_table(&dag));
            print!("{}", report::dump_graph(&dag, Direction::Forward));
            print!("{}", report::dump_graph(&dag, Direction::Reverse));
        }
        Some("--keys") => {
            report::traverse_reverse(&mut dag);
            print!("{}", report::dump_node_table(&dag));
        }
        Some("--diff") => {
            let (Some(src_id), Some(dest_id)) = (args.get(2), args.get(3)) else {
                bail!("--diff requires <src-id> <dest-id>");
            };
            let src = find_snapshot(&log_dir, src_id)?;
            let dest = find_snapshot(&log_dir, dest_id)?;

            let store = DirStore::new(&log_dir);
            let src_live = live_file_set(&store, &src.path)
                .with_context(|| format!("listing live files of '{}'", src.path.display()))?;
            let dest_live = live_file_set(&store, &dest.path)
                .with_context(|| format!("listing live files of '{}'", dest.path.display()))?;

            let result = compute_diff(&dag, src.generation, &src_live, dest.generation, &dest_live);
            print_file_set("different", &result.different);
            print_file_set("same", &result.same);
        }
        Some(other) => bail!("unknown option: {}", other),
    }

    Ok(())
}

/// Resolve a snapshot id against the registry persisted by the tracker.
fn find_snapshot(log_dir: &std::path::Path, id: &str) -> anyhow::Result<Snapshot> {
    #[derive(serde::Deserialize)]
    struct Registry {
        snapshots: Vec<Snapshot>,
    }
    let path = log_dir.join("snapshots.json");
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading snapshot registry {}", path.display()))?;
    let registry: Registry = serde_json::from_str(&contents)?;
    registry
        .snapshots
        .into_iter()
        .find(|s| s.id == id)
        .with_context(|| format!("snapshot '{}' not in registry", id))
}

fn print_file_set(label: &str, files: &HashSet<FileId>) {
    let mut sorted: Vec<&FileId> = files.iter().collect();
    sorted.sort();
    println!(
        "{}: [{}]",
        label,
        sorted
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
}
