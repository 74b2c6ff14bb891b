use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use stripe_align::fill::fill;
use stripe_align::matrix::DpMatrix;
use stripe_align::metrics::DpMetrics;
use stripe_align::profile::{Precision, QueryProfile};
use stripe_align::scalar::ScalarDp;
use stripe_align::scoring::Scoring;

fn generate_random_sequence(len: usize, seed: u64) -> Vec<u8> {
    // Simple LCG random number generator for reproducible sequences
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng.wrapping_mul(1103515245).wrapping_add(12345);
            ((rng / 65536) % 4) as u8
        })
        .collect()
}

fn generate_sequence_with_mutations(seq: &[u8], mutation_rate: f64, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    seq.iter()
        .map(|&base| {
            rng = rng.wrapping_mul(1103515245).wrapping_add(12345);
            let rand_val = (rng % 1000) as f64 / 1000.0;
            if rand_val < mutation_rate {
                (base + 1 + ((rng / 1000) % 3) as u8) % 4
            } else {
                base
            }
        })
        .collect()
}

/// Striped u8/i16 fill against the scalar reference across read lengths
fn bench_fill(c: &mut Criterion) {
    let sc = Scoring::default();
    let mut group = c.benchmark_group("striped_fill");

    for &len in &[50usize, 100, 250, 500] {
        let read = generate_random_sequence(len, 0x5EED);
        let reference = generate_sequence_with_mutations(&read, 0.05, 0xBEEF);
        group.throughput(Throughput::Elements((len * len) as u64));

        group.bench_with_input(BenchmarkId::new("u8", len), &len, |b, _| {
            let prof = QueryProfile::build(&read, &sc, Precision::U8).unwrap();
            let mut mat = DpMatrix::new();
            let mut metrics = DpMetrics::new();
            b.iter(|| black_box(fill(&mut mat, &prof, &reference, &sc, &mut metrics)));
        });

        group.bench_with_input(BenchmarkId::new("i16", len), &len, |b, _| {
            let prof = QueryProfile::build(&read, &sc, Precision::I16).unwrap();
            let mut mat = DpMatrix::new();
            let mut metrics = DpMetrics::new();
            b.iter(|| black_box(fill(&mut mat, &prof, &reference, &sc, &mut metrics)));
        });

        group.bench_with_input(BenchmarkId::new("scalar", len), &len, |b, _| {
            b.iter(|| black_box(ScalarDp::fill(&read, &reference, &sc).best()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fill);
criterion_main!(benches);
