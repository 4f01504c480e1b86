//! Criterion benchmarks for the order-list merge.
//!
//! Merge runs on every accepted `UpdateOrder`; lists are tiny (bounded by
//! the peer cap) so the interesting number is the constant factor.
//!
//! Run with:
//! ```bash
//! cargo bench --package deskring-core --bench merge_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use deskring_core::merge;

fn node_list(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("node-{i:02}")).collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for count in [4usize, 8, 16] {
        let a = node_list(0..count);
        // A rotated view with one id dropped, the common churn shape.
        let mut b = a.clone();
        b.rotate_left(1);
        b.pop();
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &(a, b),
            |bench, (a, b)| {
                bench.iter(|| merge(black_box(a), black_box(b)));
            },
        );
    }
    group.finish();
}

fn bench_merge_disjoint(c: &mut Criterion) {
    let a = node_list(0..16);
    let b = node_list(16..32);
    c.bench_function("merge_disjoint_16", |bench| {
        bench.iter(|| merge(black_box(&a), black_box(&b)));
    });
}

criterion_group!(benches, bench_merge, bench_merge_disjoint);
criterion_main!(benches);
