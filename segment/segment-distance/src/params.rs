//! Parameters for distance reinitialization.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{DistanceError, DistanceResult};

/// Smallest magnitude written for a non-zero input voxel.
///
/// Keeps the sign of voxels whose distance underflows.
pub(crate) const MIN_MAGNITUDE: f32 = 1e-6;

/// Strategy used to rebuild the distance field from the zero crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DistanceStrategy {
    /// Upwind pseudo-time evolution confined to a tube, solved separately
    /// for the outside and the inside.
    FrontPropagation,
    /// One-pass monotonic Eikonal solve seeded from the iso-contour.
    #[default]
    FastMarching,
    /// Two-pass chamfer transform seeded from the iso-contour.
    ///
    /// The chamfer weights assume isotropic voxels even when the spacing is
    /// anisotropic. Only the iso-contour seeds account for spacing.
    Chamfer,
    /// Vector (Danielsson) propagation that also marks the inside skeleton.
    Shape,
}

impl DistanceStrategy {
    /// Whether the strategy needs the tube computed by the band builder.
    #[must_use]
    pub const fn uses_tube(self) -> bool {
        matches!(self, Self::FrontPropagation)
    }

    /// Whether the strategy produces a skeleton.
    #[must_use]
    pub const fn produces_skeleton(self) -> bool {
        matches!(self, Self::Shape)
    }
}

/// Parameters for distance reinitialization.
///
/// # Example
///
/// ```
/// use segment_distance::DistanceParams;
///
/// let params = DistanceParams::default().band(6.0);
/// assert!((params.far_value() - 7.0).abs() < 1e-6);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistanceParams {
    /// Half-width of the narrow band. Distances saturate at `band + 1`.
    pub band: f32,

    /// Pseudo-time step of the front-propagation solver.
    pub init_dt: f32,

    /// Deepest inside distance reached by the shape strategy.
    /// Values above zero are treated as zero.
    pub shape_min_dist: f32,

    /// Replace seeded magnitudes below one voxel by 0.5.
    pub binarize_iso_contour: bool,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            band: 4.0,
            init_dt: 0.2,
            shape_min_dist: -20.0,
            binarize_iso_contour: false,
        }
    }
}

impl DistanceParams {
    /// Set the band half-width.
    #[must_use]
    pub const fn band(mut self, band: f32) -> Self {
        self.band = band;
        self
    }

    /// Set the front-propagation time step.
    #[must_use]
    pub const fn init_dt(mut self, dt: f32) -> Self {
        self.init_dt = dt;
        self
    }

    /// Set the deepest inside distance for the shape strategy.
    #[must_use]
    pub const fn shape_min_dist(mut self, distance: f32) -> Self {
        self.shape_min_dist = distance;
        self
    }

    /// Enable or disable iso-contour binarization.
    #[must_use]
    pub const fn binarize_iso_contour(mut self, enabled: bool) -> Self {
        self.binarize_iso_contour = enabled;
        self
    }

    /// Magnitude written far from the crossing.
    #[must_use]
    pub fn far_value(&self) -> f32 {
        self.band + 1.0
    }

    /// Inside limit for the shape strategy, never above zero.
    #[must_use]
    pub fn inside_limit(&self) -> f32 {
        self.shape_min_dist.min(0.0)
    }

    /// Number of pseudo-time steps the front-propagation solver may take.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn max_front_steps(&self) -> usize {
        // Validated positive and finite
        (self.band / self.init_dt).floor() as usize + 1
    }

    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the band or time step is not finite and positive,
    /// or if the inside limit is not finite.
    pub fn validate(&self) -> DistanceResult<()> {
        if !self.band.is_finite() || self.band <= 0.0 {
            return Err(DistanceError::invalid_params(format!(
                "band must be positive, got {}",
                self.band
            )));
        }
        if !self.init_dt.is_finite() || self.init_dt <= 0.0 {
            return Err(DistanceError::invalid_params(format!(
                "init_dt must be positive, got {}",
                self.init_dt
            )));
        }
        if !self.shape_min_dist.is_finite() {
            return Err(DistanceError::invalid_params("shape_min_dist must be finite"));
        }
        Ok(())
    }
}
