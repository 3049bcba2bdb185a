//! Parameters for level-set evolution.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use segment_distance::{DistanceParams, DistanceStrategy};

use crate::error::{LevelSetError, LevelSetResult};
use crate::intensity::{IntensityModel, IntensityPreprocessing};

/// Discretization of the image advection term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AdvectionScheme {
    /// One-sided differences chosen per axis by the sign of the advection
    /// vector.
    #[default]
    Upwind,
    /// Central differences along the advection vector.
    Central,
    /// Dilation or erosion driven by the sign of the second intensity
    /// derivative along the gradient.
    Morphological,
}

/// Curvature measure used for smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CurvatureScheme {
    /// Mean curvature.
    #[default]
    Mean,
    /// Smaller principal curvature, which preserves thin tubular shapes.
    /// Planar images only have one curvature, so this equals `Mean` in 2D.
    SmallerPrincipal,
}

/// Gradient estimate multiplying the balloon force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BalloonScheme {
    /// One-sided gradient magnitude picked by the direction of motion.
    #[default]
    Directional,
    /// Largest drop towards axis, face-diagonal and corner neighbours,
    /// normalized by neighbour distance.
    Vessel,
}

/// Sign flips counted by the convergence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FlipDirection {
    /// Voxels that left the segmentation (shrinking contours).
    #[default]
    InsideToOutside,
    /// Voxels that joined the segmentation (growing contours).
    OutsideToInside,
    /// Any sign change.
    Either,
}

impl FlipDirection {
    /// Whether a voxel recorded at `before` and now at `after` counts.
    #[must_use]
    pub fn counts(self, before: f32, after: f32) -> bool {
        let was_inside = before <= 0.0;
        let is_inside = after <= 0.0;
        match self {
            Self::InsideToOutside => was_inside && !is_inside,
            Self::OutsideToInside => !was_inside && is_inside,
            Self::Either => was_inside != is_inside,
        }
    }
}

/// Parameters for level-set evolution.
///
/// Supplied once at construction. Use
/// [`LevelSetEngine::reconfigure`](crate::LevelSetEngine::reconfigure) to
/// change them later, which forces a full reinitialization.
///
/// # Example
///
/// ```
/// use segment_levelset::{BalloonScheme, EvolutionParams};
///
/// let params = EvolutionParams::default();
/// assert!((params.band - 4.0).abs() < 1e-6);
/// assert_eq!(params.reinit_freq, 3);
///
/// let vessel = EvolutionParams::vessel().num_iters(200).threads(4);
/// assert_eq!(vessel.balloon_scheme, BalloonScheme::Vessel);
/// assert_eq!(vessel.threads, 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EvolutionParams {
    /// Half-width of the narrow band in world units.
    pub band: f32,

    /// Half-width of the front-propagation tube. Must be smaller than `band`.
    /// Also bounds the inner band: voxels beyond it are sentinels.
    pub tube: f32,

    /// Time step of the evolution.
    pub step_dt: f32,

    /// Pseudo-time step of front-propagation reinitialization.
    pub init_dt: f32,

    /// Reinitialize after this many iterations without a band rebuild.
    pub reinit_freq: usize,

    /// Check convergence every this many iterations.
    pub check_freq: usize,

    /// Converged when the flip ratio drops below this value.
    pub converged_threshold: f32,

    /// Which sign flips the convergence check counts.
    pub flip_direction: FlipDirection,

    /// Iteration budget.
    pub num_iters: usize,

    /// Weight of the image advection term.
    pub advection_coeff: f32,

    /// Discretization of the advection term.
    pub advection_scheme: AdvectionScheme,

    /// Weight advection by the cosine between the level-set and image
    /// gradients.
    pub cosine_weighting: bool,

    /// Quantile of the second-derivative magnitude used to normalize the
    /// morphological advection field.
    pub histogram_gradient_threshold: f32,

    /// Weight of the curvature term.
    pub coeff_curvature: f32,

    /// Curvature measure.
    pub curvature_scheme: CurvatureScheme,

    /// Weight of the balloon force. Positive values expand where the
    /// balloon speed is positive.
    pub balloon_coeff: f32,

    /// Gradient estimate for the balloon force.
    pub balloon_scheme: BalloonScheme,

    /// Weight of the external velocity term.
    pub coeff_velocity: f32,

    /// Distance reinitialization strategy.
    pub distance_strategy: DistanceStrategy,

    /// Deepest inside distance explored by the shape strategy.
    pub shape_min_dist: f32,

    /// Binarize iso-contour seeds during reinitialization.
    pub binarize_iso_contour: bool,

    /// Worker threads for the evolution pass. `0` and `1` run on the
    /// calling thread.
    pub threads: usize,

    /// Intensity clamping and rescaling applied before evolution.
    pub intensity: IntensityPreprocessing,

    /// Gaussian intensity model driving the balloon force.
    pub intensity_model: Option<IntensityModel>,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            band: 4.0,
            tube: 2.0,
            step_dt: 0.1,
            init_dt: 0.2,
            reinit_freq: 3,
            check_freq: 20,
            converged_threshold: 0.02,
            flip_direction: FlipDirection::InsideToOutside,
            num_iters: 10,
            advection_coeff: 1.0,
            advection_scheme: AdvectionScheme::Upwind,
            cosine_weighting: false,
            histogram_gradient_threshold: 0.8,
            coeff_curvature: 1.0,
            curvature_scheme: CurvatureScheme::Mean,
            balloon_coeff: 0.0,
            balloon_scheme: BalloonScheme::Directional,
            coeff_velocity: 1e-2,
            distance_strategy: DistanceStrategy::FastMarching,
            shape_min_dist: -20.0,
            binarize_iso_contour: false,
            threads: 1,
            intensity: IntensityPreprocessing::default(),
            intensity_model: None,
        }
    }
}

impl EvolutionParams {
    /// Balloon-driven region growing without image advection.
    ///
    /// Needs a balloon map or an intensity model.
    #[must_use]
    pub fn region_growing() -> Self {
        Self {
            advection_coeff: 0.0,
            coeff_curvature: 0.2,
            balloon_coeff: 1.0,
            flip_direction: FlipDirection::OutsideToInside,
            num_iters: 200,
            ..Self::default()
        }
    }

    /// Edge-attracted contour: curvature plus upwind image advection.
    #[must_use]
    pub fn edge_driven() -> Self {
        Self {
            advection_coeff: 1.0,
            advection_scheme: AdvectionScheme::Upwind,
            coeff_curvature: 0.5,
            num_iters: 200,
            ..Self::default()
        }
    }

    /// Thin tubular structures: smaller principal curvature, vessel balloon
    /// and morphological advection.
    #[must_use]
    pub fn vessel() -> Self {
        Self {
            advection_coeff: 0.5,
            advection_scheme: AdvectionScheme::Morphological,
            coeff_curvature: 0.2,
            curvature_scheme: CurvatureScheme::SmallerPrincipal,
            balloon_coeff: 1.0,
            balloon_scheme: BalloonScheme::Vessel,
            flip_direction: FlipDirection::OutsideToInside,
            num_iters: 300,
            ..Self::default()
        }
    }

    /// Set the band half-width.
    #[must_use]
    pub const fn band(mut self, band: f32) -> Self {
        self.band = band;
        self
    }

    /// Set the tube half-width.
    #[must_use]
    pub const fn tube(mut self, tube: f32) -> Self {
        self.tube = tube;
        self
    }

    /// Set the evolution time step.
    #[must_use]
    pub const fn step_dt(mut self, dt: f32) -> Self {
        self.step_dt = dt;
        self
    }

    /// Set the iteration budget.
    #[must_use]
    pub const fn num_iters(mut self, iterations: usize) -> Self {
        self.num_iters = iterations;
        self
    }

    /// Set the reinitialization frequency.
    #[must_use]
    pub const fn reinit_freq(mut self, iterations: usize) -> Self {
        self.reinit_freq = iterations;
        self
    }

    /// Set the convergence check frequency and threshold.
    #[must_use]
    pub const fn convergence(mut self, check_freq: usize, threshold: f32) -> Self {
        self.check_freq = check_freq;
        self.converged_threshold = threshold;
        self
    }

    /// Set which sign flips count towards convergence.
    #[must_use]
    pub const fn flip_direction(mut self, direction: FlipDirection) -> Self {
        self.flip_direction = direction;
        self
    }

    /// Set the advection weight and scheme.
    #[must_use]
    pub const fn advection(mut self, coeff: f32, scheme: AdvectionScheme) -> Self {
        self.advection_coeff = coeff;
        self.advection_scheme = scheme;
        self
    }

    /// Set the curvature weight.
    #[must_use]
    pub const fn curvature(mut self, coeff: f32) -> Self {
        self.coeff_curvature = coeff;
        self
    }

    /// Set the curvature measure.
    #[must_use]
    pub const fn curvature_scheme(mut self, scheme: CurvatureScheme) -> Self {
        self.curvature_scheme = scheme;
        self
    }

    /// Set the balloon weight.
    #[must_use]
    pub const fn balloon(mut self, coeff: f32) -> Self {
        self.balloon_coeff = coeff;
        self
    }

    /// Set the balloon gradient scheme.
    #[must_use]
    pub const fn balloon_scheme(mut self, scheme: BalloonScheme) -> Self {
        self.balloon_scheme = scheme;
        self
    }

    /// Set the velocity weight.
    #[must_use]
    pub const fn velocity(mut self, coeff: f32) -> Self {
        self.coeff_velocity = coeff;
        self
    }

    /// Set the distance reinitialization strategy.
    #[must_use]
    pub const fn distance_strategy(mut self, strategy: DistanceStrategy) -> Self {
        self.distance_strategy = strategy;
        self
    }

    /// Set the worker thread count.
    #[must_use]
    pub const fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set intensity preprocessing.
    #[must_use]
    pub fn intensity(mut self, intensity: IntensityPreprocessing) -> Self {
        self.intensity = intensity;
        self
    }

    /// Set the Gaussian intensity model.
    #[must_use]
    pub fn intensity_model(mut self, model: IntensityModel) -> Self {
        self.intensity_model = Some(model);
        self
    }

    /// Saturation value of the field, `band + 1`.
    #[must_use]
    pub fn field_limit(&self) -> f32 {
        self.band + 1.0
    }

    /// Parameters handed to the distance engine.
    #[must_use]
    pub const fn distance_params(&self) -> DistanceParams {
        DistanceParams {
            band: self.band,
            init_dt: self.init_dt,
            shape_min_dist: self.shape_min_dist,
            binarize_iso_contour: self.binarize_iso_contour,
        }
    }

    /// Whether the advection term is active.
    #[must_use]
    pub fn has_advection(&self) -> bool {
        self.advection_coeff.abs() > 1e-10
    }

    /// Check the parameters for invalid or contradictory values.
    ///
    /// # Errors
    ///
    /// Returns [`LevelSetError::Configuration`] describing the first problem
    /// found.
    pub fn validate(&self) -> LevelSetResult<()> {
        let positive = [
            ("band", self.band),
            ("tube", self.tube),
            ("step_dt", self.step_dt),
            ("init_dt", self.init_dt),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(LevelSetError::configuration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let finite = [
            ("advection_coeff", self.advection_coeff),
            ("balloon_coeff", self.balloon_coeff),
            ("coeff_velocity", self.coeff_velocity),
            ("coeff_curvature", self.coeff_curvature),
            ("shape_min_dist", self.shape_min_dist),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(LevelSetError::configuration(format!(
                    "{name} must be finite"
                )));
            }
        }
        if self.tube >= self.band {
            return Err(LevelSetError::configuration(format!(
                "tube ({}) must be smaller than band ({})",
                self.tube, self.band
            )));
        }
        if self.coeff_curvature < 0.0 {
            return Err(LevelSetError::configuration(
                "coeff_curvature must not be negative",
            ));
        }
        if self.reinit_freq == 0 || self.check_freq == 0 {
            return Err(LevelSetError::configuration(
                "reinit_freq and check_freq must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.converged_threshold) {
            return Err(LevelSetError::configuration(format!(
                "converged_threshold must be in [0, 1], got {}",
                self.converged_threshold
            )));
        }
        if !(self.histogram_gradient_threshold > 0.0 && self.histogram_gradient_threshold <= 1.0)
        {
            return Err(LevelSetError::configuration(format!(
                "histogram_gradient_threshold must be in (0, 1], got {}",
                self.histogram_gradient_threshold
            )));
        }
        self.intensity.validate()?;
        if let Some(model) = &self.intensity_model {
            model.validate()?;
        }
        Ok(())
    }
}
