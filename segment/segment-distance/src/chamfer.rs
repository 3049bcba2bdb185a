//! Two-pass chamfer reinitialization.
//!
//! Starting from the iso-contour seeds, a forward raster pass pulls
//! distances from already-visited neighbours and a backward pass from the
//! remaining ones. Weights are in voxel units: the transform treats the
//! spacing as isotropic.

use segment_types::VolumeGeometry;

use crate::iso_contour::IsoContour;
use crate::params::{DistanceParams, MIN_MAGNITUDE};

/// Chamfer weights for axis, face-diagonal and cube-diagonal steps in 3D.
const WEIGHTS_3D: [f32; 3] = [1.0, 1.314, 1.628];

/// One neighbour of the chamfer mask.
#[derive(Debug, Clone, Copy)]
struct MaskEntry {
    offset: isize,
    weight: f32,
}

/// Neighbours visited before the current voxel in raster order.
///
/// The backward pass uses the same entries with negated offsets.
fn half_mask(geometry: &VolumeGeometry) -> Vec<MaskEntry> {
    let [sx, sy, sz] = geometry.strides();
    let planar = geometry.is_planar();
    let z_range: &[isize] = if planar { &[0] } else { &[-1, 0, 1] };

    let mut mask = Vec::with_capacity(13);
    for &dz in z_range {
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let offset = dx * sx + dy * sy + dz * sz;
                if offset >= 0 {
                    continue;
                }
                let steps = dx.unsigned_abs() + dy.unsigned_abs() + dz.unsigned_abs();
                let weight = if planar {
                    if steps == 1 { 1.0 } else { std::f32::consts::SQRT_2 }
                } else {
                    WEIGHTS_3D[steps - 1]
                };
                mask.push(MaskEntry { offset, weight });
            }
        }
    }
    mask
}

/// Pull a candidate distance for the voxel holding `value` from a
/// neighbour holding `neighbor`.
fn relax(value: f32, neighbor: f32, weight: f32, far: f32) -> f32 {
    if neighbor.abs() >= far {
        return value;
    }
    if value > 0.0 && neighbor > -weight {
        value.min(neighbor + weight)
    } else if value < 0.0 && neighbor < weight {
        value.max(neighbor - weight)
    } else {
        value
    }
}

/// Rebuild `output` with a chamfer transform of the iso-contour seeds.
pub(crate) fn chamfer(
    geometry: &VolumeGeometry,
    iso: &IsoContour,
    params: &DistanceParams,
    output: &mut [f32],
) {
    let far = params.far_value();
    output.copy_from_slice(&iso.values);

    let mask = half_mask(geometry);
    let [tx, ty, _] = geometry.dims();
    let z_range = geometry.interior_z();

    // Forward pass
    for z in z_range.clone() {
        for y in 1..ty - 1 {
            for x in 1..tx - 1 {
                let p = geometry.index(x, y, z);
                let mut value = output[p];
                for entry in &mask {
                    value = relax(value, output[geometry.offset(p, entry.offset)], entry.weight, far);
                }
                output[p] = value;
            }
        }
    }

    // Backward pass
    for z in z_range.rev() {
        for y in (1..ty - 1).rev() {
            for x in (1..tx - 1).rev() {
                let p = geometry.index(x, y, z);
                let mut value = output[p];
                for entry in &mask {
                    value = relax(value, output[geometry.offset(p, -entry.offset)], entry.weight, far);
                }
                output[p] = value;
            }
        }
    }

    for value in output.iter_mut() {
        if *value != 0.0 {
            *value = value.abs().clamp(MIN_MAGNITUDE, far).copysign(*value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso_contour::seed;
    use approx::assert_relative_eq;

    #[test]
    fn test_mask_sizes() {
        let volume = VolumeGeometry::isotropic([5, 5, 5]).unwrap();
        assert_eq!(half_mask(&volume).len(), 13);
        let planar = VolumeGeometry::isotropic([5, 5, 1]).unwrap();
        assert_eq!(half_mask(&planar).len(), 4);
    }

    #[test]
    fn test_relax_respects_sign() {
        assert_relative_eq!(relax(5.0, 0.3, 1.0, 5.0), 1.3);
        assert_relative_eq!(relax(-5.0, -0.3, 1.0, 5.0), -1.3);
        // Far neighbours never propagate
        assert_relative_eq!(relax(5.0, 5.0, 1.0, 5.0), 5.0);
        // A deep negative neighbour cannot lower a positive voxel
        assert_relative_eq!(relax(4.0, -2.0, 1.0, 5.0), 4.0);
    }

    #[test]
    fn test_planar_line() {
        let geometry = VolumeGeometry::isotropic([16, 8, 1]).unwrap();
        let input: Vec<f32> = (0..geometry.len())
            .map(|i| geometry.coords(i)[0] as f32 - 7.5)
            .map(|v| v * 4.0)
            .collect();
        let params = DistanceParams::default();
        let iso = seed(&geometry, &input, &params, false);
        let mut output = vec![0.0; input.len()];
        chamfer(&geometry, &iso, &params, &mut output);

        assert_relative_eq!(output[geometry.index(8, 4, 0)], 0.5, epsilon = 1e-5);
        assert_relative_eq!(output[geometry.index(10, 4, 0)], 2.5, epsilon = 1e-5);
        assert_relative_eq!(output[geometry.index(5, 4, 0)], -2.5, epsilon = 1e-5);
        assert_relative_eq!(output[geometry.index(14, 4, 0)], 5.0);
    }

    #[test]
    fn test_border_keeps_seed_values() {
        let geometry = VolumeGeometry::isotropic([16, 8, 1]).unwrap();
        let input: Vec<f32> = (0..geometry.len())
            .map(|i| geometry.coords(i)[0] as f32 - 7.5)
            .collect();
        let params = DistanceParams::default();
        let iso = seed(&geometry, &input, &params, false);
        let mut output = vec![0.0; input.len()];
        chamfer(&geometry, &iso, &params, &mut output);

        // Row y = 0 is border: only the seeded pair is below the far value
        assert_relative_eq!(output[geometry.index(10, 0, 0)], 5.0);
        assert_relative_eq!(output[geometry.index(8, 0, 0)], 0.5, epsilon = 1e-5);
    }
}
