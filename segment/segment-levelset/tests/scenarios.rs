//! End-to-end segmentation scenarios on synthetic images.
//!
//! Run with: cargo test -p segment-levelset --test scenarios --release

use segment_levelset::{
    AdvectionScheme, EvolutionParams, FlipDirection, GaussianClass, Initialization,
    IntensityModel, LevelSetEngine, SeedSphere, SegmentationInput,
};
use segment_types::{Point3, ScalarVolume, VolumeGeometry};

// =============================================================================
// Helpers
// =============================================================================

const CENTER: f64 = 32.0;

fn distance_to_center(x: usize, y: usize, z: usize) -> f64 {
    let d = [x, y, z].map(|c| c as f64 - CENTER);
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}

/// 64³ volume with a bright sphere of radius 10 in the middle.
fn bright_sphere(inside: impl Fn(f64) -> f32) -> ScalarVolume {
    let geometry = VolumeGeometry::isotropic([64, 64, 64]).unwrap();
    ScalarVolume::from_fn(geometry, |x, y, z| {
        let d = distance_to_center(x, y, z);
        if d <= 10.0 { inside(d) } else { 20.0 }
    })
}

/// Sub-voxel positions of the zero crossing along the six axis rays leaving
/// the center.
fn axis_radii(field: &ScalarVolume) -> Vec<f64> {
    let geometry = *field.geometry();
    let c = CENTER as usize;
    let mut radii = Vec::new();
    for axis in 0..3 {
        for sign in [-1isize, 1] {
            let sample = |step: usize| {
                let mut p = [c, c, c];
                p[axis] = (c as isize + sign * step as isize) as usize;
                f64::from(field.values()[geometry.index(p[0], p[1], p[2])])
            };
            let step = (1..31).find(|&s| sample(s) > 0.0).unwrap();
            let (inner, outer) = (sample(step - 1), sample(step));
            radii.push((step - 1) as f64 + inner / (inner - outer));
        }
    }
    radii
}

/// Number of 4-connected inside regions of a planar field.
fn inside_components(field: &[f32], geometry: &VolumeGeometry) -> usize {
    let [nx, ny, _] = geometry.dims();
    let mut seen = vec![false; field.len()];
    let mut components = 0;
    for start in 0..field.len() {
        if seen[start] || field[start] > 0.0 {
            continue;
        }
        components += 1;
        seen[start] = true;
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            let [x, y, _] = geometry.coords(index);
            let neighbors = [
                (x > 0).then(|| index - 1),
                (x + 1 < nx).then(|| index + 1),
                (y > 0).then(|| index - nx),
                (y + 1 < ny).then(|| index + nx),
            ];
            for next in neighbors.into_iter().flatten() {
                if !seen[next] && field[next] <= 0.0 {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }
    }
    components
}

// =============================================================================
// Curvature flow stopped at an edge
// =============================================================================

#[test]
fn test_curvature_flow_settles_on_sphere_edge() {
    let image = bright_sphere(|_| 200.0);
    let geometry = *image.geometry();
    let weight = image
        .values()
        .iter()
        .map(|&v| if v > 100.0 { 0.0 } else { 1.0 })
        .collect();
    let seed = SeedSphere::new(Point3::new(CENTER, CENTER, CENTER), 12.0);
    let input = SegmentationInput::new(image, Initialization::seeds(vec![seed]))
        .with_curvature_weight(weight);

    let params = EvolutionParams::default()
        .band(4.0)
        .advection(0.0, AdvectionScheme::Upwind)
        .curvature(1.0)
        .step_dt(0.15)
        .convergence(40, 0.02)
        .num_iters(600)
        .threads(4);

    let result = LevelSetEngine::new(input, params).unwrap().run().unwrap();
    assert!(result.status.is_converged(), "status {:?}", result.status);
    assert!(result.warnings.is_empty());

    for radius in axis_radii(&result.field) {
        assert!((radius - 10.0).abs() <= 1.0, "radius {radius}");
    }

    // Every voxel of the bright sphere stays inside.
    for (index, &value) in result.field.values().iter().enumerate() {
        let [x, y, z] = geometry.coords(index);
        if distance_to_center(x, y, z) <= 10.0 {
            assert!(value <= 0.0);
        }
    }
}

// =============================================================================
// Balloon growth from an intensity model
// =============================================================================

#[test]
fn test_balloon_growth_stops_at_sharp_edge() {
    // Two foreground intensities: a bright core and a dimmer shell.
    let image = bright_sphere(|d| if d <= 6.0 { 220.0 } else { 160.0 });
    let geometry = *image.geometry();
    let seed = SeedSphere::new(Point3::new(CENTER, CENTER, CENTER), 5.0);
    let model = IntensityModel::new(vec![
        GaussianClass::new(220.0, 20.0),
        GaussianClass::new(160.0, 20.0),
    ]);

    let params = EvolutionParams::region_growing()
        .intensity_model(model)
        .num_iters(400)
        .threads(4);
    assert_eq!(params.flip_direction, FlipDirection::OutsideToInside);

    let input = SegmentationInput::new(image, Initialization::seeds(vec![seed]));
    let result = LevelSetEngine::new(input, params).unwrap().run().unwrap();
    assert!(result.status.is_converged(), "status {:?}", result.status);

    for radius in axis_radii(&result.field) {
        assert!((radius - 10.0).abs() <= 1.0, "radius {radius}");
    }

    let leaked = result
        .field
        .values()
        .iter()
        .enumerate()
        .filter(|&(index, &value)| {
            let [x, y, z] = geometry.coords(index);
            value <= 0.0 && distance_to_center(x, y, z) > 11.5
        })
        .count();
    assert_eq!(leaked, 0);
}

// =============================================================================
// Topology: separate fronts merge on contact
// =============================================================================

#[test]
fn test_disjoint_seeds_merge_on_contact() {
    let geometry = VolumeGeometry::isotropic([32, 32, 1]).unwrap();
    let image = ScalarVolume::filled(geometry, 100.0);
    let seeds = vec![
        SeedSphere::new(Point3::new(10.0, 16.0, 0.0), 4.5),
        SeedSphere::new(Point3::new(22.0, 16.0, 0.0), 4.5),
    ];
    let input = SegmentationInput::new(image, Initialization::seeds(seeds))
        .with_balloon_map(vec![1.0; geometry.len()]);
    let params = EvolutionParams::region_growing().num_iters(30);

    let mut engine = LevelSetEngine::new(input, params).unwrap();
    assert_eq!(inside_components(engine.field(), &geometry), 2);

    for _ in 0..5 {
        engine.iterate().unwrap();
    }
    assert_eq!(inside_components(engine.field(), &geometry), 2);

    // Mirror-symmetric seeds grow at the same rate.
    let left = engine
        .field()
        .iter()
        .enumerate()
        .filter(|&(i, &v)| v <= 0.0 && geometry.coords(i)[0] < 16)
        .count();
    let right = engine
        .field()
        .iter()
        .enumerate()
        .filter(|&(i, &v)| v <= 0.0 && geometry.coords(i)[0] > 16)
        .count();
    assert!(left.abs_diff(right) <= 2, "left {left}, right {right}");

    let result = engine.run().unwrap();
    assert_eq!(result.iterations, 30);
    assert_eq!(inside_components(result.field.values(), &geometry), 1);
}
