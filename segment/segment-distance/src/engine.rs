//! Strategy dispatch for distance reinitialization.

use segment_types::VolumeGeometry;
use tracing::{debug, warn};

use crate::chamfer::chamfer;
use crate::error::{DistanceError, DistanceResult};
use crate::fast_marching::fast_marching;
use crate::front::{TubeVoxel, front_propagation, tube_from_field};
use crate::iso_contour::{has_crossing, seed};
use crate::params::{DistanceParams, DistanceStrategy};
use crate::shape::shape_propagation;

/// Outcome of one reinitialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceReport {
    /// Strategy that produced the field.
    pub strategy: DistanceStrategy,
    /// The input never crossed zero; the output is uniform.
    pub empty_crossing: bool,
    /// Voxels seeded from the crossing (or reached by front propagation).
    pub seeded: usize,
    /// Voxels marked as skeleton (shape strategy only).
    pub skeleton_voxels: usize,
}

/// Rebuilds a signed distance field from the zero crossing of a level set.
///
/// The strategy is fixed for the lifetime of the engine. Every strategy
/// keeps the sign of non-zero input voxels, saturates at `band + 1` and
/// grows in magnitude away from the crossing.
///
/// # Example
///
/// ```
/// use segment_distance::{DistanceMapEngine, DistanceParams, DistanceStrategy};
/// use segment_types::VolumeGeometry;
///
/// let geometry = VolumeGeometry::isotropic([16, 16, 1]).unwrap();
/// let input: Vec<f32> = (0..geometry.len())
///     .map(|i| 3.0 * (geometry.coords(i)[0] as f32 - 7.5))
///     .collect();
///
/// let mut engine =
///     DistanceMapEngine::new(geometry, DistanceStrategy::FastMarching, DistanceParams::default())
///         .unwrap();
/// let mut output = vec![0.0; input.len()];
/// let report = engine.reinitialize(&input, &mut output, None).unwrap();
///
/// assert!(!report.empty_crossing);
/// assert!((output[geometry.index(9, 8, 0)] - 1.5).abs() < 1e-4);
/// ```
#[derive(Debug, Clone)]
pub struct DistanceMapEngine {
    geometry: VolumeGeometry,
    strategy: DistanceStrategy,
    params: DistanceParams,
    skeleton: Vec<bool>,
}

impl DistanceMapEngine {
    /// Create an engine for volumes of `geometry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid.
    pub fn new(
        geometry: VolumeGeometry,
        strategy: DistanceStrategy,
        params: DistanceParams,
    ) -> DistanceResult<Self> {
        params.validate()?;
        Ok(Self {
            geometry,
            strategy,
            params,
            skeleton: Vec::new(),
        })
    }

    /// Strategy in use.
    #[must_use]
    pub const fn strategy(&self) -> DistanceStrategy {
        self.strategy
    }

    /// Parameters in use.
    #[must_use]
    pub const fn params(&self) -> &DistanceParams {
        &self.params
    }

    /// Skeleton produced by the last shape reinitialization.
    #[must_use]
    pub fn skeleton(&self) -> Option<&[bool]> {
        (self.strategy.produces_skeleton() && !self.skeleton.is_empty())
            .then_some(self.skeleton.as_slice())
    }

    /// Rebuild `output` from the zero crossing of `input`.
    ///
    /// `tube` is only used by front propagation; when it is `None` the tube
    /// is derived from `input` with a half-width of `band / 2`.
    ///
    /// If `input` never crosses zero, `output` is filled with `±(band + 1)`
    /// following the input sign and the report flags an empty crossing.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` or `output` does not match the geometry.
    pub fn reinitialize(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        tube: Option<&[TubeVoxel]>,
    ) -> DistanceResult<DistanceReport> {
        self.check_len("input", input.len())?;
        self.check_len("output", output.len())?;

        let far = self.params.far_value();
        let mut report = DistanceReport {
            strategy: self.strategy,
            empty_crossing: false,
            seeded: 0,
            skeleton_voxels: 0,
        };

        if !has_crossing(&self.geometry, input) {
            warn!(
                voxels = input.len(),
                "Level set has no zero crossing, filling with far value"
            );
            for (out, &value) in output.iter_mut().zip(input) {
                *out = far.copysign(value);
            }
            self.skeleton.clear();
            report.empty_crossing = true;
            return Ok(report);
        }

        match self.strategy {
            DistanceStrategy::FrontPropagation => {
                let derived;
                let tube = if let Some(tube) = tube {
                    tube
                } else {
                    derived = tube_from_field(input, self.params.band / 2.0);
                    &derived
                };
                report.seeded =
                    front_propagation(&self.geometry, input, tube, &self.params, output);
            }
            DistanceStrategy::FastMarching => {
                let iso = seed(&self.geometry, input, &self.params, false);
                report.seeded = iso.seeds.len();
                fast_marching(&self.geometry, input, &iso, &self.params, output);
            }
            DistanceStrategy::Chamfer => {
                let iso = seed(&self.geometry, input, &self.params, false);
                report.seeded = iso.seeds.len();
                chamfer(&self.geometry, &iso, &self.params, output);
            }
            DistanceStrategy::Shape => {
                let iso = seed(&self.geometry, input, &self.params, true);
                report.seeded = iso.seeds.len();
                let offsets = iso.offsets.as_deref().unwrap_or_default();
                report.skeleton_voxels = shape_propagation(
                    &self.geometry,
                    input,
                    &iso,
                    offsets,
                    &self.params,
                    output,
                    &mut self.skeleton,
                );
            }
        }

        debug!(
            strategy = ?self.strategy,
            seeded = report.seeded,
            skeleton = report.skeleton_voxels,
            "Distance map rebuilt"
        );
        Ok(report)
    }

    fn check_len(&self, what: &'static str, actual: usize) -> DistanceResult<()> {
        if actual == self.geometry.len() {
            Ok(())
        } else {
            Err(DistanceError::LengthMismatch {
                what,
                expected: self.geometry.len(),
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn disk(geometry: &VolumeGeometry, radius: f32) -> Vec<f32> {
        (0..geometry.len())
            .map(|i| {
                let [x, y, _] = geometry.coords(i);
                let dx = x as f32 - 16.0;
                let dy = y as f32 - 16.0;
                2.0 * ((dx * dx + dy * dy).sqrt() - radius)
            })
            .collect()
    }

    const ALL: [DistanceStrategy; 4] = [
        DistanceStrategy::FrontPropagation,
        DistanceStrategy::FastMarching,
        DistanceStrategy::Chamfer,
        DistanceStrategy::Shape,
    ];

    #[test]
    fn test_all_strategies_approximate_distance() {
        let geometry = VolumeGeometry::isotropic([32, 32, 1]).unwrap();
        let input = disk(&geometry, 8.0);
        let probe = geometry.index(26, 16, 0);

        for strategy in ALL {
            let mut engine =
                DistanceMapEngine::new(geometry, strategy, DistanceParams::default()).unwrap();
            let mut output = vec![0.0; input.len()];
            let report = engine.reinitialize(&input, &mut output, None).unwrap();
            assert!(!report.empty_crossing);
            assert_relative_eq!(output[probe], 2.0, epsilon = 0.4);
            assert!(output.iter().all(|v| v.abs() <= 5.0));
        }
    }

    #[test]
    fn test_empty_crossing_fills_uniform() {
        let geometry = VolumeGeometry::isotropic([8, 8, 8]).unwrap();
        let input = vec![-2.0; geometry.len()];
        for strategy in ALL {
            let mut engine =
                DistanceMapEngine::new(geometry, strategy, DistanceParams::default()).unwrap();
            let mut output = vec![0.0; input.len()];
            let report = engine.reinitialize(&input, &mut output, None).unwrap();
            assert!(report.empty_crossing);
            assert!(output.iter().all(|v| (*v + 5.0).abs() < f32::EPSILON));
        }
    }

    #[test]
    fn test_length_mismatch() {
        let geometry = VolumeGeometry::isotropic([4, 4, 4]).unwrap();
        let mut engine = DistanceMapEngine::new(
            geometry,
            DistanceStrategy::Chamfer,
            DistanceParams::default(),
        )
        .unwrap();
        let mut output = vec![0.0; 64];
        let result = engine.reinitialize(&[1.0; 10], &mut output, None);
        assert!(matches!(
            result,
            Err(DistanceError::LengthMismatch { what: "input", .. })
        ));
    }

    #[test]
    fn test_skeleton_only_for_shape() {
        let geometry = VolumeGeometry::isotropic([32, 32, 1]).unwrap();
        let input = disk(&geometry, 8.0);
        let mut output = vec![0.0; input.len()];

        let mut shape =
            DistanceMapEngine::new(geometry, DistanceStrategy::Shape, DistanceParams::default())
                .unwrap();
        assert!(shape.skeleton().is_none());
        let report = shape.reinitialize(&input, &mut output, None).unwrap();
        assert!(report.skeleton_voxels > 0);
        let skeleton = shape.skeleton().unwrap();
        // The disk center lies on the medial axis neighbourhood
        let near_center = (15..=17)
            .flat_map(|y| (15..=17).map(move |x| (x, y)))
            .any(|(x, y)| skeleton[geometry.index(x, y, 0)]);
        assert!(near_center);

        let mut fmm = DistanceMapEngine::new(
            geometry,
            DistanceStrategy::FastMarching,
            DistanceParams::default(),
        )
        .unwrap();
        fmm.reinitialize(&input, &mut output, None).unwrap();
        assert!(fmm.skeleton().is_none());
    }
}
