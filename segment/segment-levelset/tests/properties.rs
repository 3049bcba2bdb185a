//! Invariants of the evolution loop that must hold for any input.
//!
//! Run with: cargo test -p segment-levelset --test properties

use proptest::prelude::*;
use segment_levelset::{
    ConvergenceMonitor, EvolutionParams, FlipDirection, Initialization, LevelSetEngine,
    NarrowBandBuilder, SeedSphere, SegmentationInput,
};
use segment_types::{Point3, ScalarVolume, VolumeGeometry};

// =============================================================================
// Strategies
// =============================================================================

fn arb_dims() -> impl Strategy<Value = [usize; 3]> {
    prop_oneof![Just([12usize, 12, 1]), Just([9, 14, 1]), Just([8, 8, 8])]
}

/// Random field within `±limit`.
fn arb_field(limit: f32) -> impl Strategy<Value = (VolumeGeometry, Vec<f32>)> {
    arb_dims().prop_flat_map(move |dims| {
        let geometry = VolumeGeometry::isotropic(dims).unwrap();
        (
            Just(geometry),
            prop::collection::vec(-limit..limit, geometry.len()),
        )
    })
}

/// Random balloon map over a random grid.
fn arb_balloon() -> impl Strategy<Value = (VolumeGeometry, Vec<f32>)> {
    arb_field(3.0)
}

fn seeded_input(geometry: VolumeGeometry, balloon: Vec<f32>) -> SegmentationInput {
    let [x, y, z] = geometry.dims();
    let center = Point3::new((x / 2) as f64, (y / 2) as f64, (z / 2) as f64);
    SegmentationInput::new(
        ScalarVolume::filled(geometry, 0.0),
        Initialization::seeds(vec![SeedSphere::new(center, 2.5)]),
    )
    .with_balloon_map(balloon)
}

fn disk(geometry: &VolumeGeometry, radius: f32) -> Vec<f32> {
    (0..geometry.len())
        .map(|i| {
            let [x, y, _] = geometry.coords(i);
            let dx = x as f32 - 24.0;
            let dy = y as f32 - 24.0;
            ((dx * dx + dy * dy).sqrt() - radius).clamp(-5.0, 5.0)
        })
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn field_stays_within_limit((geometry, balloon) in arb_balloon(), dt in 0.05f32..0.5) {
        let params = EvolutionParams::default()
            .curvature(0.5)
            .balloon(1.0)
            .step_dt(dt)
            .num_iters(8);
        let mut engine = LevelSetEngine::new(seeded_input(geometry, balloon), params).unwrap();
        let limit = engine.params().field_limit();

        prop_assert!(engine.field().iter().all(|v| v.abs() <= limit));
        while !engine.iterate().unwrap().is_terminal() {
            prop_assert!(engine.field().iter().all(|v| v.abs() <= limit));
        }
    }

    #[test]
    fn band_rebuild_is_idempotent((geometry, field) in arb_field(6.0)) {
        let builder = NarrowBandBuilder::new(geometry, 4.0, 2.0, true);
        let mut first = builder.empty_band();
        builder.rebuild(&field, &mut first);
        let mut second = first.clone();
        builder.rebuild(&field, &mut second);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn thread_count_does_not_change_result((geometry, balloon) in arb_balloon()) {
        let params = EvolutionParams::default().curvature(0.3).balloon(1.0).num_iters(6);

        let single = LevelSetEngine::new(
            seeded_input(geometry, balloon.clone()),
            params.clone().threads(1),
        )
        .unwrap()
        .run()
        .unwrap();
        let pooled = LevelSetEngine::new(seeded_input(geometry, balloon), params.threads(4))
            .unwrap()
            .run()
            .unwrap();

        // Bit-identical, not merely close
        prop_assert_eq!(single.field.values(), pooled.field.values());
        prop_assert_eq!(
            single.last_stats.map(|s| s.band_voxels),
            pooled.last_stats.map(|s| s.band_voxels)
        );
    }
}

#[test]
fn monitor_converges_on_settling_contour() {
    // Radius 12 settling towards 8, halving the gap at every check.
    let geometry = VolumeGeometry::isotropic([48, 48, 1]).unwrap();
    let builder = NarrowBandBuilder::new(geometry, 4.0, 2.0, false);
    let mut band = builder.empty_band();
    let mut monitor = ConvergenceMonitor::new(0.02, FlipDirection::InsideToOutside);

    let mut field = disk(&geometry, 12.0);
    builder.rebuild(&field, &mut band);
    monitor.record(&band);

    let mut converged_at = None;
    for check in 1..=10 {
        let radius = 8.0 + 4.0 / 2f32.powi(check);
        field = disk(&geometry, radius);
        let outcome = monitor.evaluate(&field);
        if check == 1 {
            assert!(!outcome.converged, "first check flipped {}", outcome.flipped);
        }
        if outcome.converged {
            converged_at = Some(check);
            break;
        }
        builder.rebuild(&field, &mut band);
        monitor.record(&band);
    }
    assert!(converged_at.is_some_and(|check| check < 10));
}

#[test]
fn reconfigure_resumes_after_terminal_status() {
    let geometry = VolumeGeometry::isotropic([16, 16, 1]).unwrap();
    let input = seeded_input(geometry, vec![1.0; geometry.len()]);
    let params = EvolutionParams::region_growing().num_iters(4);
    let mut engine = LevelSetEngine::new(input, params.clone()).unwrap();

    while !engine.iterate().unwrap().is_terminal() {}
    assert_eq!(engine.iteration(), 4);

    engine.reconfigure(params.num_iters(8)).unwrap();
    assert!(!engine.status().is_terminal());
    let result = engine.run().unwrap();
    assert_eq!(result.iterations, 8);
}
