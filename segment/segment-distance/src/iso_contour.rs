//! Sub-voxel distances next to the zero crossing.
//!
//! Every pair of axis neighbours with opposite signs gets a linear estimate
//! of its distance to the crossing, corrected for the gradient direction.
//! The resulting seeds start the fast-marching, chamfer and shape solvers.

use nalgebra::Vector3;
use segment_types::VolumeGeometry;

use crate::params::{DistanceParams, MIN_MAGNITUDE};

const EPSILON: f64 = 1e-10;

/// Seeded distances around the zero crossing.
#[derive(Debug, Clone)]
pub(crate) struct IsoContour {
    /// Signed seed distances; `±far` away from the crossing, 0 where the
    /// input is exactly 0.
    pub values: Vec<f32>,
    /// Voxels that received a seed distance (including exact zeros).
    pub seeds: Vec<usize>,
    /// Vector from the crossing point to each seeded voxel.
    pub offsets: Option<Vec<Vector3<f32>>>,
}

/// Whether the field changes sign anywhere.
///
/// A voxel holding exactly 0 counts as a crossing.
pub(crate) fn has_crossing(geometry: &VolumeGeometry, field: &[f32]) -> bool {
    let [tx, ty, tz] = geometry.dims();
    let strides = geometry.strides();
    if field.iter().any(|v| *v == 0.0) {
        return true;
    }
    for z in 0..tz {
        for y in 0..ty {
            for x in 0..tx {
                let p = geometry.index(x, y, z);
                let inside = field[p] > 0.0;
                for (axis, c) in [x, y, z].into_iter().enumerate() {
                    if c + 1 < geometry.dims()[axis] {
                        let q = geometry.offset(p, strides[axis]);
                        if (field[q] > 0.0) != inside {
                            return true;
                        }
                    }
                }
            }
        }
    }
    false
}

/// Seed distances next to the zero crossing.
pub(crate) fn seed(
    geometry: &VolumeGeometry,
    input: &[f32],
    params: &DistanceParams,
    with_offsets: bool,
) -> IsoContour {
    let far = params.far_value();
    let dims = geometry.dims();
    let strides = geometry.strides();
    let spacing = geometry.spacing();

    let mut values: Vec<f32> = input
        .iter()
        .map(|&v| if v == 0.0 { 0.0 } else { far.copysign(v) })
        .collect();
    let mut seeded: Vec<bool> = input.iter().map(|v| *v == 0.0).collect();
    let mut offsets = with_offsets.then(|| vec![Vector3::<f32>::zeros(); input.len()]);

    let mut record = |index: usize, distance: f64, direction: &Vector3<f64>| {
        let reference = input[index];
        if reference == 0.0 {
            return;
        }
        #[allow(clippy::cast_possible_truncation)]
        let distance = distance as f32;
        if seeded[index] && distance.abs() >= values[index].abs() {
            return;
        }
        let signed = distance.abs().max(MIN_MAGNITUDE).copysign(reference);
        values[index] = signed;
        seeded[index] = true;
        if let Some(offsets) = offsets.as_mut() {
            offsets[index] = direction.cast::<f32>() * signed;
        }
    };

    for z in 0..dims[2] {
        for y in 0..dims[1] {
            for x in 0..dims[0] {
                let coords = [x, y, z];
                let p = geometry.index(x, y, z);
                let v0 = f64::from(input[p]);

                let mut gradient = Vector3::<f64>::zeros();
                for axis in 0..3 {
                    let n = dims[axis];
                    if n == 1 {
                        continue;
                    }
                    let h = spacing[axis];
                    gradient[axis] = if coords[axis] + 1 < n {
                        let q = geometry.offset(p, strides[axis]);
                        (f64::from(input[q]) - v0) / h
                    } else {
                        let q = geometry.offset(p, -strides[axis]);
                        (v0 - f64::from(input[q])) / h
                    };
                }
                let norm = gradient.norm();

                for axis in 0..3 {
                    if coords[axis] + 1 >= dims[axis] {
                        continue;
                    }
                    let q = geometry.offset(p, strides[axis]);
                    let v1 = f64::from(input[q]);
                    if (v0 > 0.0) == (v1 > 0.0) {
                        continue;
                    }
                    let diff = (v0 - v1).abs();
                    if diff < EPSILON {
                        continue;
                    }
                    let h = spacing[axis];
                    let (factor, direction) = if norm > EPSILON {
                        (gradient[axis].abs() * h / norm / diff, gradient / norm)
                    } else {
                        let mut unit = Vector3::zeros();
                        unit[axis] = 1.0;
                        (h / diff, unit)
                    };
                    record(p, v0 * factor, &direction);
                    record(q, v1 * factor, &direction);
                }
            }
        }
    }

    if params.binarize_iso_contour {
        for (value, &is_seed) in values.iter_mut().zip(&seeded) {
            if is_seed && *value != 0.0 && value.abs() < 1.0 {
                *value = 0.5f32.copysign(*value);
            }
        }
    }

    let seeds = seeded
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.then_some(i))
        .collect();

    IsoContour {
        values,
        seeds,
        offsets,
    }
}
