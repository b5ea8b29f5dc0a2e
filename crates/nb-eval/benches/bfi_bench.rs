use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nb_eval::bfi::IntervalSet;

fn sparse_set(n: i64, stride: i64, width: i64) -> IntervalSet {
    let pairs = (0..n).map(|i| (i * stride, i * stride + width)).collect();
    IntervalSet::from_sorted(pairs)
}

fn bench_interval_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("IntervalSet");

    let sizes = [100, 1_000, 10_000];

    for n in sizes.iter() {
        let a = sparse_set(*n, 10, 4);
        let b = sparse_set(*n, 10, 7);

        group.bench_with_input(BenchmarkId::new("Union", n), n, |bench, _| {
            bench.iter(|| black_box(&a).union(black_box(&b)))
        });

        group.bench_with_input(BenchmarkId::new("Intersect", n), n, |bench, _| {
            bench.iter(|| black_box(&a).intersect(black_box(&b)))
        });

        group.bench_with_input(BenchmarkId::new("Complement", n), n, |bench, _| {
            bench.iter(|| black_box(&a).complement(black_box((0, n * 10))))
        });

        group.bench_with_input(BenchmarkId::new("Contains/Midpoint", n), n, |bench, _| {
            bench.iter(|| black_box(&a).contains(black_box(n * 5)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_interval_set);
criterion_main!(benches);
