//! Benchmarks for level-set evolution.
//!
//! Run with: cargo bench -p segment-levelset
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p segment-levelset -- --save-baseline main
//! 2. After changes: cargo bench -p segment-levelset -- --baseline main

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use segment_levelset::{
    DistanceStrategy, EvolutionParams, Initialization, LevelSetEngine, SeedSphere,
    SegmentationInput,
};
use segment_types::{Point3, ScalarVolume, VolumeGeometry};

// =============================================================================
// Test Volume Generation
// =============================================================================

/// Cube of side `n` with a bright ball and a seed sphere inside it.
fn create_input(n: usize) -> SegmentationInput {
    let geometry = VolumeGeometry::isotropic([n, n, n]).unwrap();
    let c = (n / 2) as f64;
    let r = n as f64 / 4.0;
    let image = ScalarVolume::from_fn(geometry, |x, y, z| {
        let d = [x, y, z].map(|v| v as f64 - c);
        if (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt() <= r {
            200.0
        } else {
            20.0
        }
    });
    let seed = SeedSphere::new(Point3::new(c, c, c), r * 0.75);
    SegmentationInput::new(image, Initialization::seeds(vec![seed]))
        .with_balloon_map(vec![0.5; geometry.len()])
}

fn params(threads: usize) -> EvolutionParams {
    EvolutionParams::edge_driven()
        .balloon(1.0)
        .threads(threads)
        .reinit_freq(usize::MAX)
}

// =============================================================================
// Evolution Benchmarks
// =============================================================================

fn bench_evolution_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("EvolutionPass");
    group.sample_size(20); // Engine setup per sample is slow

    for n in [32usize, 64] {
        let input = create_input(n);
        let band_voxels = LevelSetEngine::new(input.clone(), params(1))
            .unwrap()
            .band()
            .len();
        group.throughput(Throughput::Elements(band_voxels as u64));

        for threads in [1usize, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("threads_{threads}"), n),
                &input,
                |b, input| {
                    b.iter_batched(
                        || LevelSetEngine::new(input.clone(), params(threads)).unwrap(),
                        |mut engine| black_box(engine.iterate()),
                        BatchSize::LargeInput,
                    );
                },
            );
        }
    }

    group.finish();
}

fn bench_reinitialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reinitialization");
    group.sample_size(10);

    let input = create_input(48);
    for strategy in [
        DistanceStrategy::FastMarching,
        DistanceStrategy::Chamfer,
        DistanceStrategy::FrontPropagation,
    ] {
        group.bench_with_input(
            BenchmarkId::new("engine_setup", format!("{strategy:?}")),
            &input,
            |b, input| {
                let params = params(1).distance_strategy(strategy);
                b.iter(|| LevelSetEngine::new(black_box(input.clone()), params.clone()));
            },
        );
    }

    group.finish();
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(benches, bench_evolution_pass, bench_reinitialization);
criterion_main!(benches);
