//! De-interleaving throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lib_types::channel::SampleLayout;
use lib_types::samples::{deinterleave_complex, deinterleave_variance};

fn bench_deinterleave(c: &mut Criterion) {
    let mut group = c.benchmark_group("deinterleave");

    for len in [4096usize, 65536, 1 << 20].iter() {
        let buffer: Vec<f64> = (0..*len).map(|i| (i as f64 * 0.01).sin()).collect();

        group.bench_with_input(BenchmarkId::new("complex", len), &buffer, |b, buf| {
            b.iter(|| deinterleave_complex(black_box(buf)));
        });

        group.bench_with_input(BenchmarkId::new("variance", len), &buffer, |b, buf| {
            b.iter(|| deinterleave_variance(black_box(buf), SampleLayout::Complex));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_deinterleave);
criterion_main!(benches);
