// -------------------------------------------------------------------------
// SCPN Collimator Core -- Kahn Sampler Benchmark
// Measures rejection-sampling throughput across the energy range where
// the two Kahn branches trade off (80 keV tube spectra to 6 MeV LINAC).
// -------------------------------------------------------------------------

use colli_physics::sampler::KleinNishinaSampler;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

fn bench_kahn_sampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("kahn_sampler");

    for &energy_kev in &[80.0, 511.0, 1000.0, 6000.0] {
        group.bench_with_input(
            BenchmarkId::new("sample", format!("{energy_kev}keV")),
            &energy_kev,
            |b, &e| {
                let mut sampler = KleinNishinaSampler::new(42);
                b.iter(|| black_box(sampler.sample(e)));
            },
        );
    }

    group.bench_function("batch_10k_1MeV", |b| {
        let mut sampler = KleinNishinaSampler::new(42);
        b.iter(|| black_box(sampler.sample_batch(1000.0, 10_000)));
    });

    group.finish();
}

criterion_group!(benches, bench_kahn_sampler);
criterion_main!(benches);
