use std::collections::HashSet;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use sstdiff::lineage::{compute_diff, CompactionDag};
use sstdiff::FileId;

/// Build a compaction chain of the given depth: each round merges the
/// previous output with a fresh flush file, the shape a steadily
/// written column family produces. Returns the DAG plus the live sets
/// of the oldest and newest snapshots.
fn build_chain(depth: usize) -> (CompactionDag, HashSet<FileId>, HashSet<FileId>) {
    let mut dag = CompactionDag::new();
    let mut current = FileId::new("base");
    let dest_live: HashSet<FileId> = [current.clone()].into_iter().collect();

    for round in 0..depth {
        let flush = FileId::new(format!("flush{}", round));
        let merged = FileId::new(format!("merged{}", round));
        dag.apply_compaction(
            &[current.clone(), flush.clone()],
            &[merged.clone()],
            100 + round as u64,
            "bench",
            None,
        );
        current = merged;
    }

    let src_live: HashSet<FileId> = [current].into_iter().collect();
    (dag, src_live, dest_live)
}

fn diff_chain_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_chain");
    for depth in [16usize, 256, 4096] {
        let (dag, src_live, dest_live) = build_chain(depth);
        let src_generation = 100 + depth as u64;
        group.bench_function(format!("depth_{}", depth), |b| {
            b.iter(|| compute_diff(&dag, src_generation, &src_live, 100, &dest_live));
        });
    }
    group.finish();
}

fn dag_build_benchmark(c: &mut Criterion) {
    c.bench_function("dag_build_4096_compactions", |b| {
        b.iter_batched(
            CompactionDag::new,
            |mut dag| {
                let mut current = FileId::new("base");
                for round in 0..4096 {
                    let flush = FileId::new(format!("flush{}", round));
                    let merged = FileId::new(format!("merged{}", round));
                    dag.apply_compaction(
                        &[current.clone(), flush],
                        &[merged.clone()],
                        100 + round as u64,
                        "bench",
                        None,
                    );
                    current = merged;
                }
                dag
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, diff_chain_benchmark, dag_build_benchmark);
criterion_main!(benches);
