//! Image data-attachment fields, computed once per run.
//!
//! All derivatives are central differences on the preprocessed intensity
//! with neighbours reflected at the volume border.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)] // histogram bins and f64 -> f32 storage

use nalgebra::{Matrix3, Vector3};
use segment_distance::{DistanceMapEngine, DistanceParams, DistanceStrategy};
use segment_types::VolumeGeometry;

use crate::error::LevelSetResult;

/// Gradients below this magnitude have no direction.
const MIN_GRADIENT: f64 = 1e-5;

/// Bins of the histogram used for the normalization quantile.
const HISTOGRAM_BINS: usize = 10_000;

/// Gradient and Hessian of `values` at one voxel.
fn derivatives(
    geometry: &VolumeGeometry,
    values: &[f32],
    index: usize,
) -> (Vector3<f64>, Matrix3<f64>) {
    let [x, y, z] = geometry.coords(index);
    let offsets = geometry.neighbor_offsets(x, y, z);
    let spacing = geometry.spacing();
    let at = |delta: isize| f64::from(values[geometry.offset(index, delta)]);
    let center = f64::from(values[index]);

    let mut gradient = Vector3::zeros();
    let mut hessian = Matrix3::zeros();
    for a in 0..3 {
        let (m, p) = (offsets.minus[a], offsets.plus[a]);
        gradient[a] = (at(p) - at(m)) / (2.0 * spacing[a]);
        hessian[(a, a)] = (at(p) - 2.0 * center + at(m)) / (spacing[a] * spacing[a]);
        for b in (a + 1)..3 {
            let (mb, pb) = (offsets.minus[b], offsets.plus[b]);
            let mixed = (at(p + pb) + at(m + mb) - at(p + mb) - at(m + pb))
                / (4.0 * spacing[a] * spacing[b]);
            hessian[(a, b)] = mixed;
            hessian[(b, a)] = mixed;
        }
    }
    (gradient, hessian)
}

fn to_f32(v: Vector3<f64>) -> Vector3<f32> {
    Vector3::new(v.x as f32, v.y as f32, v.z as f32)
}

/// Central-difference intensity gradient at every voxel.
pub(crate) fn image_gradient(geometry: &VolumeGeometry, values: &[f32]) -> Vec<Vector3<f32>> {
    (0..values.len())
        .map(|index| to_f32(derivatives(geometry, values, index).0))
        .collect()
}

/// Advection vectors `H(I) ∇I / |∇I|`, zero where the gradient vanishes.
pub(crate) fn attachment_vectors(geometry: &VolumeGeometry, values: &[f32]) -> Vec<Vector3<f32>> {
    (0..values.len())
        .map(|index| {
            let (gradient, hessian) = derivatives(geometry, values, index);
            let norm = gradient.norm();
            if norm <= MIN_GRADIENT {
                Vector3::zeros()
            } else {
                to_f32(hessian * gradient / norm)
            }
        })
        .collect()
}

/// Signed second derivative along the gradient, normalized for
/// morphological advection.
///
/// The raw value `n · H n` (with `n = ∇I / |∇I|`) is replaced by its
/// distance to its own zero crossing, saturated at 2 voxels, and then
/// weighted by `1 - exp(-|H n|² / θ²)` where `θ` is the `quantile` of
/// `|H n|` over the volume.
pub(crate) fn morphological_field(
    geometry: &VolumeGeometry,
    values: &[f32],
    quantile: f32,
) -> LevelSetResult<Vec<f32>> {
    let mut second = Vec::with_capacity(values.len());
    let mut strength = Vec::with_capacity(values.len());
    for index in 0..values.len() {
        let (gradient, hessian) = derivatives(geometry, values, index);
        let norm = gradient.norm();
        if norm <= MIN_GRADIENT {
            second.push(0.0);
            strength.push(0.0);
        } else {
            let n = gradient / norm;
            let hn = hessian * n;
            second.push(n.dot(&hn) as f32);
            strength.push(hn.norm() as f32);
        }
    }

    let mut normalized = vec![0.0; values.len()];
    let mut engine = DistanceMapEngine::new(
        *geometry,
        DistanceStrategy::FastMarching,
        DistanceParams::default().band(1.0),
    )?;
    engine.reinitialize(&second, &mut normalized, None)?;

    let theta = histogram_quantile(&strength, quantile);
    for (value, &s) in normalized.iter_mut().zip(&strength) {
        let weight = if theta > 0.0 {
            1.0 - (-(s * s) / (theta * theta)).exp()
        } else {
            0.0
        };
        *value *= weight;
    }
    Ok(normalized)
}

/// Value below which a `quantile` fraction of `values` falls, read from a
/// 10 000-bin histogram.
pub(crate) fn histogram_quantile(values: &[f32], quantile: f32) -> f32 {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if values.is_empty() || max - min <= f32::EPSILON {
        return max.max(0.0);
    }
    let width = (max - min) / HISTOGRAM_BINS as f32;
    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for &v in values {
        let bin = (((v - min) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    // Sample count the quantile must cover, computed in f32 so 0.8 * 100 is 80
    let needed = (quantile * values.len() as f32).ceil() as usize;
    let mut cumulative = 0usize;
    for (bin, &count) in counts.iter().enumerate() {
        cumulative += count;
        if cumulative >= needed {
            return min + (bin + 1) as f32 * width;
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3 as V3;

    fn quadratic(geometry: &VolumeGeometry) -> Vec<f32> {
        (0..geometry.len())
            .map(|i| {
                let x = geometry.coords(i)[0] as f32;
                x * x
            })
            .collect()
    }

    #[test]
    fn test_gradient_and_hessian() {
        let geometry = VolumeGeometry::isotropic([8, 5, 5]).unwrap();
        let values = quadratic(&geometry);
        let (gradient, hessian) = derivatives(&geometry, &values, geometry.index(3, 2, 2));
        assert_relative_eq!(gradient.x, 6.0);
        assert_relative_eq!(gradient.y, 0.0);
        assert_relative_eq!(hessian[(0, 0)], 2.0);
        assert_relative_eq!(hessian[(0, 1)], 0.0);
    }

    #[test]
    fn test_reflected_border_gradient_is_zero() {
        let geometry = VolumeGeometry::isotropic([8, 5, 1]).unwrap();
        let values = quadratic(&geometry);
        let gradient = image_gradient(&geometry, &values);
        assert_eq!(gradient[geometry.index(0, 2, 0)], V3::zeros());
        assert_relative_eq!(gradient[geometry.index(4, 2, 0)].x, 8.0);
    }

    #[test]
    fn test_attachment_vectors() {
        let geometry = VolumeGeometry::isotropic([8, 5, 5]).unwrap();
        let values = quadratic(&geometry);
        let vectors = attachment_vectors(&geometry, &values);
        // H ∇I / |∇I| = (2, 0, 0) for I = x²
        let v = vectors[geometry.index(3, 2, 2)];
        assert_relative_eq!(v.x, 2.0);
        assert_relative_eq!(v.y, 0.0);

        let flat = vec![3.0; geometry.len()];
        assert!(attachment_vectors(&geometry, &flat).iter().all(|v| *v == V3::zeros()));
    }

    #[test]
    fn test_morphological_field_sign() {
        let geometry = VolumeGeometry::isotropic([32, 5, 1]).unwrap();
        // Smooth step: convex below x = 16, concave above
        let values: Vec<f32> = (0..geometry.len())
            .map(|i| {
                let x = geometry.coords(i)[0] as f32;
                100.0 * (1.0 + ((x - 16.0) / 3.0).tanh())
            })
            .collect();
        let field = morphological_field(&geometry, &values, 0.8).unwrap();
        assert!(field[geometry.index(13, 2, 0)] > 0.0);
        assert!(field[geometry.index(19, 2, 0)] < 0.0);
        assert!(field.iter().all(|v| v.abs() <= 2.0));
    }

    #[test]
    fn test_histogram_quantile() {
        let values: Vec<f32> = (0..100).map(|i| i as f32).collect();
        // 80 of 100 samples lie at or below 79
        assert_relative_eq!(histogram_quantile(&values, 0.8), 79.0, epsilon = 0.02);
        assert_relative_eq!(histogram_quantile(&[2.0; 4], 0.5), 2.0);
        // Exact quantile counts land on the bin that completes them
        assert_relative_eq!(histogram_quantile(&[0.0, 1.0, 2.0, 3.0], 0.5), 1.0, epsilon = 0.01);
        assert_relative_eq!(histogram_quantile(&[0.0, 1.0, 2.0, 3.0], 0.75), 2.0, epsilon = 0.01);
    }
}
