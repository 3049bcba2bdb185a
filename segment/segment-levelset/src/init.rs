//! Initial level-set fields.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)] // voxel coordinates are small and non-negative

use nalgebra::Point3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use segment_distance::DistanceStrategy;
use segment_types::{ScalarVolume, VolumeGeometry};

use crate::error::{LevelSetError, LevelSetResult};
use crate::intensity::PreparedIntensity;
use crate::params::EvolutionParams;

/// Which side of a threshold the structure lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Polarity {
    /// The structure is brighter than the threshold.
    #[default]
    Bright,
    /// The structure is darker than the threshold.
    Dark,
}

impl Polarity {
    fn signed(self, value: f32, iso: f32) -> f32 {
        match self {
            Self::Bright => iso - value,
            Self::Dark => value - iso,
        }
    }
}

/// A seed sphere (a disk on planar grids).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeedSphere {
    /// Center in voxel coordinates.
    pub center: Point3<f64>,
    /// Radius in world units.
    pub radius: f64,
}

impl SeedSphere {
    /// Create a seed.
    #[must_use]
    pub const fn new(center: Point3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Voxel-index bounds of the sphere grown by `margin` world units,
    /// clipped to the volume.
    fn bounds(&self, geometry: &VolumeGeometry, margin: f64) -> [(usize, usize); 3] {
        let dims = geometry.dims();
        let spacing = geometry.spacing();
        let mut bounds = [(0, 0); 3];
        for axis in 0..3 {
            if dims[axis] == 1 {
                continue;
            }
            let extent = (self.radius + margin) / spacing[axis];
            let lo = (self.center[axis] - extent).floor().max(0.0);
            let hi = (self.center[axis] + extent).ceil().min((dims[axis] - 1) as f64);
            bounds[axis] = if hi < lo {
                (1, 0)
            } else {
                (lo as usize, hi as usize)
            };
        }
        bounds
    }

    fn distance(&self, geometry: &VolumeGeometry, voxel: [usize; 3]) -> f64 {
        let spacing = geometry.spacing();
        let planar = geometry.is_planar();
        let mut squared = 0.0;
        for axis in 0..3 {
            if axis == 2 && planar {
                continue;
            }
            let d = (voxel[axis] as f64 - self.center[axis]) * spacing[axis];
            squared += d * d;
        }
        squared.sqrt() - self.radius
    }

    fn validate(&self) -> LevelSetResult<()> {
        let finite = self.center.iter().all(|c| c.is_finite());
        if !finite || !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(LevelSetError::configuration(format!(
                "invalid seed at {:?} with radius {}",
                self.center, self.radius
            )));
        }
        Ok(())
    }
}

/// How the level-set field is seeded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Initialization {
    /// Global intensity threshold in original intensity units.
    Threshold {
        /// Threshold value.
        value: f32,
        /// Side of the threshold that is inside.
        polarity: Polarity,
    },

    /// Union of seed spheres.
    Seeds(Vec<SeedSphere>),

    /// Caller-supplied prior field, one value per voxel.
    Prior {
        /// Prior values.
        field: Vec<f32>,
        /// Iso value separating inside from outside.
        iso_value: f32,
        /// Side of the iso value that is inside.
        polarity: Polarity,
    },
}

impl Initialization {
    /// Seed initialization from a list of spheres.
    #[must_use]
    pub const fn seeds(seeds: Vec<SeedSphere>) -> Self {
        Self::Seeds(seeds)
    }

    /// Threshold initialization selecting bright voxels.
    #[must_use]
    pub const fn threshold(value: f32) -> Self {
        Self::Threshold {
            value,
            polarity: Polarity::Bright,
        }
    }

    /// Check the initialization against a grid.
    ///
    /// # Errors
    ///
    /// Returns [`LevelSetError::MissingSeeds`] for an empty seed list, a
    /// length mismatch for a prior of the wrong size, or a configuration
    /// error for non-finite values.
    pub fn validate(&self, geometry: &VolumeGeometry) -> LevelSetResult<()> {
        match self {
            Self::Threshold { value, .. } => {
                if !value.is_finite() {
                    return Err(LevelSetError::configuration("threshold must be finite"));
                }
            }
            Self::Seeds(seeds) => {
                if seeds.is_empty() {
                    return Err(LevelSetError::MissingSeeds);
                }
                for seed in seeds {
                    seed.validate()?;
                }
            }
            Self::Prior {
                field, iso_value, ..
            } => {
                if field.len() != geometry.len() {
                    return Err(LevelSetError::length_mismatch(
                        "prior field",
                        geometry.len(),
                        field.len(),
                    ));
                }
                if !iso_value.is_finite() {
                    return Err(LevelSetError::configuration("prior iso value must be finite"));
                }
            }
        }
        Ok(())
    }

    /// Render the initial field, clamped to `±(band + 1)`.
    pub(crate) fn render(
        &self,
        geometry: &VolumeGeometry,
        intensity: &PreparedIntensity,
        params: &EvolutionParams,
    ) -> Vec<f32> {
        let limit = params.field_limit();
        match self {
            Self::Threshold { value, polarity } => {
                let threshold = intensity.threshold(*value);
                let binary = params.distance_strategy == DistanceStrategy::FrontPropagation;
                intensity
                    .values
                    .iter()
                    .map(|&i| {
                        let v = polarity.signed(i, threshold);
                        if binary {
                            if v <= 0.0 { -1.0 } else { 2.0 }
                        } else {
                            v.clamp(-limit, limit)
                        }
                    })
                    .collect()
            }
            Self::Seeds(seeds) => render_seeds(geometry, seeds, limit),
            Self::Prior {
                field,
                iso_value,
                polarity,
            } => field
                .iter()
                .map(|&p| polarity.signed(p, *iso_value).clamp(-limit, limit))
                .collect(),
        }
    }
}

fn render_seeds(geometry: &VolumeGeometry, seeds: &[SeedSphere], limit: f32) -> Vec<f32> {
    let mut field = vec![limit; geometry.len()];
    for seed in seeds {
        let [(x0, x1), (y0, y1), (z0, z1)] = seed.bounds(geometry, f64::from(limit));
        for z in z0..=z1 {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let index = geometry.index(x, y, z);
                    let d = seed.distance(geometry, [x, y, z]) as f32;
                    if d < field[index] {
                        field[index] = d.max(-limit);
                    }
                }
            }
        }
    }
    field
}

/// Mean and standard deviation of an intensity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntensityStatistics {
    /// Sample mean.
    pub mean: f32,
    /// Sample standard deviation.
    pub std_dev: f32,
    /// Number of voxels sampled.
    pub count: usize,
}

/// Intensity statistics inside the bounding cubes of `seeds`.
///
/// Useful to build a [`GaussianClass`](crate::GaussianClass) from seeds.
/// Returns `None` when no voxel is covered.
#[must_use]
pub fn seed_statistics(volume: &ScalarVolume, seeds: &[SeedSphere]) -> Option<IntensityStatistics> {
    let geometry = volume.geometry();
    let values = volume.values();
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0usize;
    for seed in seeds {
        let [(x0, x1), (y0, y1), (z0, z1)] = seed.bounds(geometry, 0.0);
        for z in z0..=z1 {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let v = f64::from(values[geometry.index(x, y, z)]);
                    sum += v;
                    sum_sq += v * v;
                    count += 1;
                }
            }
        }
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    Some(IntensityStatistics {
        mean: mean as f32,
        std_dev: variance.sqrt() as f32,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intensity::IntensityPreprocessing;
    use approx::assert_relative_eq;

    fn raw(values: Vec<f32>) -> PreparedIntensity {
        IntensityPreprocessing::raw().apply(&values)
    }

    #[test]
    fn test_seed_sphere_field() {
        let geometry = VolumeGeometry::isotropic([21, 21, 21]).unwrap();
        let intensity = raw(vec![0.0; geometry.len()]);
        let init = Initialization::seeds(vec![SeedSphere::new(Point3::new(10.0, 10.0, 10.0), 3.0)]);
        let field = init.render(&geometry, &intensity, &EvolutionParams::default());

        assert_relative_eq!(field[geometry.index(10, 10, 10)], -3.0);
        assert_relative_eq!(field[geometry.index(13, 10, 10)], 0.0);
        assert_relative_eq!(field[geometry.index(15, 10, 10)], 2.0);
        // Far from the seed
        assert_relative_eq!(field[geometry.index(0, 0, 0)], 5.0);
        assert!(field.iter().all(|v| v.abs() <= 5.0));
    }

    #[test]
    fn test_seed_union_takes_minimum() {
        let geometry = VolumeGeometry::isotropic([20, 10, 1]).unwrap();
        let intensity = raw(vec![0.0; geometry.len()]);
        let init = Initialization::seeds(vec![
            SeedSphere::new(Point3::new(4.0, 5.0, 0.0), 2.0),
            SeedSphere::new(Point3::new(14.0, 5.0, 7.0), 2.0),
        ]);
        let field = init.render(&geometry, &intensity, &EvolutionParams::default());

        // Planar grids ignore the z coordinate of the center
        assert_relative_eq!(field[geometry.index(14, 5, 0)], -2.0);
        assert_relative_eq!(field[geometry.index(4, 5, 0)], -2.0);
        assert_relative_eq!(field[geometry.index(9, 5, 0)], 3.0);
    }

    #[test]
    fn test_threshold_polarity() {
        let geometry = VolumeGeometry::isotropic([4, 1, 1]).unwrap();
        let intensity = raw(vec![0.0, 1.0, 3.0, 10.0]);
        let params = EvolutionParams::default();

        let bright = Initialization::threshold(2.0).render(&geometry, &intensity, &params);
        assert_eq!(bright, vec![2.0, 1.0, -1.0, -5.0]);

        let dark = Initialization::Threshold {
            value: 2.0,
            polarity: Polarity::Dark,
        }
        .render(&geometry, &intensity, &params);
        assert_eq!(dark, vec![-2.0, -1.0, 1.0, 5.0]);
    }

    #[test]
    fn test_threshold_binary_for_front_propagation() {
        let geometry = VolumeGeometry::isotropic([3, 1, 1]).unwrap();
        let intensity = raw(vec![0.0, 5.0, 9.0]);
        let params = EvolutionParams::default().distance_strategy(DistanceStrategy::FrontPropagation);
        let field = Initialization::threshold(4.0).render(&geometry, &intensity, &params);
        assert_eq!(field, vec![2.0, -1.0, -1.0]);
    }

    #[test]
    fn test_threshold_rescaled() {
        let geometry = VolumeGeometry::isotropic([3, 1, 1]).unwrap();
        let intensity = IntensityPreprocessing::default().apply(&[0.0, 50.0, 100.0]);
        let field = Initialization::threshold(50.0).render(
            &geometry,
            &intensity,
            &EvolutionParams::default().band(200.0).tube(1.0),
        );
        assert_relative_eq!(field[0], 127.5);
        assert_relative_eq!(field[1], 0.0);
        assert_relative_eq!(field[2], -127.5);
    }

    #[test]
    fn test_prior_field() {
        let geometry = VolumeGeometry::isotropic([3, 1, 1]).unwrap();
        let intensity = raw(vec![0.0; 3]);
        let init = Initialization::Prior {
            field: vec![0.2, 0.5, 0.9],
            iso_value: 0.5,
            polarity: Polarity::Bright,
        };
        assert!(init.validate(&geometry).is_ok());
        let field = init.render(&geometry, &intensity, &EvolutionParams::default());
        assert_relative_eq!(field[0], 0.3, epsilon = 1e-6);
        assert_relative_eq!(field[1], 0.0);
        assert_relative_eq!(field[2], -0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_validation() {
        let geometry = VolumeGeometry::isotropic([4, 4, 4]).unwrap();
        assert!(matches!(
            Initialization::seeds(Vec::new()).validate(&geometry),
            Err(LevelSetError::MissingSeeds)
        ));
        let prior = Initialization::Prior {
            field: vec![0.0; 3],
            iso_value: 0.0,
            polarity: Polarity::Dark,
        };
        assert!(matches!(
            prior.validate(&geometry),
            Err(LevelSetError::LengthMismatch { what: "prior field", .. })
        ));
        let bad_seed = Initialization::seeds(vec![SeedSphere::new(Point3::origin(), 0.0)]);
        assert!(bad_seed.validate(&geometry).unwrap_err().is_configuration());
    }

    #[test]
    fn test_seed_statistics() {
        let geometry = VolumeGeometry::isotropic([10, 10, 1]).unwrap();
        let volume = ScalarVolume::from_fn(geometry, |x, _, _| if x < 5 { 100.0 } else { 0.0 });
        let stats = seed_statistics(&volume, &[SeedSphere::new(Point3::new(2.0, 5.0, 0.0), 1.0)])
            .unwrap();
        assert_eq!(stats.count, 9);
        assert_relative_eq!(stats.mean, 100.0);
        assert_relative_eq!(stats.std_dev, 0.0);
    }
}
