//! The segmentation engine: initialization, evolution loop and finalization.

use nalgebra::Vector3;
use segment_distance::DistanceMapEngine;
use segment_types::{ScalarVolume, VolumeGeometry};
use tracing::{debug, info, warn};

use crate::attachment::{attachment_vectors, image_gradient, morphological_field};
use crate::band::{NarrowBand, NarrowBandBuilder};
use crate::convergence::ConvergenceMonitor;
use crate::error::{LevelSetError, LevelSetResult};
use crate::evolve::{Advection, ForceTerms, PassTotals, PdeEvolver};
use crate::init::Initialization;
use crate::intensity::{PreparedIntensity, balloon_speeds};
use crate::params::{AdvectionScheme, EvolutionParams};
use crate::result::{EngineWarning, EvolutionStatus, IterationStats, SegmentationResult};
use crate::scheduler::ThreadScheduler;
use crate::state::LevelSetField;

/// Everything the engine reads from the caller besides parameters.
///
/// Optional per-voxel arrays must have one entry per voxel of the
/// intensity volume.
#[derive(Debug, Clone)]
pub struct SegmentationInput {
    /// Image to segment.
    pub intensity: ScalarVolume,
    /// How the field is seeded.
    pub initialization: Initialization,
    /// Balloon speed per voxel. Overrides the intensity model.
    pub balloon_map: Option<Vec<f32>>,
    /// Advection vectors replacing the image-derived ones.
    pub advection_field: Option<Vec<Vector3<f32>>>,
    /// External velocity field.
    pub velocity_field: Option<Vec<Vector3<f32>>>,
    /// Per-voxel weight of the curvature term.
    pub curvature_weight: Option<Vec<f32>>,
}

impl SegmentationInput {
    /// Create an input with no optional arrays.
    #[must_use]
    pub const fn new(intensity: ScalarVolume, initialization: Initialization) -> Self {
        Self {
            intensity,
            initialization,
            balloon_map: None,
            advection_field: None,
            velocity_field: None,
            curvature_weight: None,
        }
    }

    /// Set the balloon map.
    #[must_use]
    pub fn with_balloon_map(mut self, map: Vec<f32>) -> Self {
        self.balloon_map = Some(map);
        self
    }

    /// Set the advection field.
    #[must_use]
    pub fn with_advection_field(mut self, field: Vec<Vector3<f32>>) -> Self {
        self.advection_field = Some(field);
        self
    }

    /// Set the velocity field.
    #[must_use]
    pub fn with_velocity_field(mut self, field: Vec<Vector3<f32>>) -> Self {
        self.velocity_field = Some(field);
        self
    }

    /// Set the curvature weight map.
    #[must_use]
    pub fn with_curvature_weight(mut self, weight: Vec<f32>) -> Self {
        self.curvature_weight = Some(weight);
        self
    }

    /// Check the input against the grid and `params`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (see
    /// [`LevelSetError::is_configuration`]) for a grid too small for the
    /// stencils, arrays of the wrong length, an invalid initialization, or a
    /// balloon force with nothing to drive it.
    pub fn validate(&self, params: &EvolutionParams) -> LevelSetResult<()> {
        let geometry = self.intensity.geometry();
        let [x, y, z] = geometry.dims();
        if x < 3 || y < 3 || (z != 1 && z < 3) {
            return Err(LevelSetError::GridTooSmall { x, y, z });
        }

        let n = geometry.len();
        let lengths = [
            ("balloon map", self.balloon_map.as_ref().map(Vec::len)),
            ("advection field", self.advection_field.as_ref().map(Vec::len)),
            ("velocity field", self.velocity_field.as_ref().map(Vec::len)),
            ("curvature weight", self.curvature_weight.as_ref().map(Vec::len)),
        ];
        for (what, len) in lengths {
            if let Some(len) = len.filter(|&len| len != n) {
                return Err(LevelSetError::length_mismatch(what, n, len));
            }
        }

        self.initialization.validate(geometry)?;

        if params.balloon_coeff != 0.0
            && self.balloon_map.is_none()
            && params.intensity_model.is_none()
        {
            return Err(LevelSetError::configuration(
                "balloon force needs a balloon map or an intensity model",
            ));
        }
        Ok(())
    }
}

/// Narrow-band level-set segmentation engine.
///
/// Construction validates everything, seeds the field and reinitializes it,
/// so the field is a clamped signed distance from the first observable
/// state on. Each [`iterate`](Self::iterate) runs at most one evolution
/// pass; [`run`](Self::run) iterates until convergence or until the
/// iteration budget is spent and returns the final field.
///
/// # Example
///
/// ```
/// use segment_levelset::{
///     EvolutionParams, Initialization, LevelSetEngine, SeedSphere, SegmentationInput,
/// };
/// use segment_types::{Point3, ScalarVolume, VolumeGeometry};
///
/// let geometry = VolumeGeometry::isotropic([24, 24, 1]).unwrap();
/// let image = ScalarVolume::filled(geometry, 100.0);
/// let seeds = vec![SeedSphere::new(Point3::new(12.0, 12.0, 0.0), 4.0)];
/// let input = SegmentationInput::new(image, Initialization::seeds(seeds))
///     .with_balloon_map(vec![1.0; geometry.len()]);
///
/// let params = EvolutionParams::region_growing().num_iters(10);
/// let engine = LevelSetEngine::new(input, params).unwrap();
/// let inside_before = engine.field().iter().filter(|v| **v <= 0.0).count();
///
/// let result = engine.run().unwrap();
/// assert_eq!(result.iterations, 10);
/// assert!(result.inside_voxels() > inside_before);
/// ```
#[derive(Debug)]
pub struct LevelSetEngine {
    geometry: VolumeGeometry,
    params: EvolutionParams,
    input: SegmentationInput,
    terms: ForceTerms,
    field: LevelSetField,
    builder: NarrowBandBuilder,
    band: NarrowBand,
    scheduler: ThreadScheduler,
    distance: DistanceMapEngine,
    monitor: ConvergenceMonitor,
    updates: Vec<f32>,
    status: EvolutionStatus,
    iteration: usize,
    since_reinit: usize,
    last_stats: Option<IterationStats>,
    warnings: Vec<EngineWarning>,
}

impl LevelSetEngine {
    /// Validate the inputs, seed the field and run the first
    /// reinitialization.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any allocation if the
    /// parameters or inputs are invalid, or an error from the thread pool or
    /// the first reinitialization.
    pub fn new(input: SegmentationInput, params: EvolutionParams) -> LevelSetResult<Self> {
        params.validate()?;
        input.validate(&params)?;

        let geometry = *input.intensity.geometry();
        let prepared = params.intensity.apply(input.intensity.values());
        let terms = prepare_terms(&geometry, &params, &input, &prepared)?;
        let seeded = input.initialization.render(&geometry, &prepared, &params);
        let field = LevelSetField::new(seeded, params.field_limit());
        let builder = band_builder(geometry, &params);
        let band = builder.empty_band();
        let scheduler = ThreadScheduler::new(params.threads)?;
        let distance =
            DistanceMapEngine::new(geometry, params.distance_strategy, params.distance_params())?;
        let monitor = ConvergenceMonitor::new(params.converged_threshold, params.flip_direction);

        info!(
            dims = ?geometry.dims(),
            strategy = ?params.distance_strategy,
            threads = scheduler.threads(),
            num_iters = params.num_iters,
            "Level-set engine initialized"
        );

        let mut engine = Self {
            geometry,
            params,
            input,
            terms,
            field,
            builder,
            band,
            scheduler,
            distance,
            monitor,
            updates: Vec::new(),
            status: EvolutionStatus::Running,
            iteration: 0,
            since_reinit: 0,
            last_stats: None,
            warnings: Vec::new(),
        };
        engine.reinitialize()?;
        engine.monitor.record(&engine.band);
        Ok(engine)
    }

    /// Grid geometry.
    #[must_use]
    pub const fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// Parameters in use.
    #[must_use]
    pub const fn params(&self) -> &EvolutionParams {
        &self.params
    }

    /// Current field values.
    #[must_use]
    pub fn field(&self) -> &[f32] {
        self.field.current()
    }

    /// Current narrow band.
    #[must_use]
    pub const fn band(&self) -> &NarrowBand {
        &self.band
    }

    /// Evolution status.
    #[must_use]
    pub const fn status(&self) -> EvolutionStatus {
        self.status
    }

    /// Evolution passes run so far.
    #[must_use]
    pub const fn iteration(&self) -> usize {
        self.iteration
    }

    /// Statistics of the last evolution pass.
    #[must_use]
    pub const fn last_stats(&self) -> Option<IterationStats> {
        self.last_stats
    }

    /// Warnings raised so far.
    #[must_use]
    pub fn warnings(&self) -> &[EngineWarning] {
        &self.warnings
    }

    /// Advance the state machine by at most one evolution pass.
    ///
    /// Every `check_freq` passes the field is reinitialized and compared
    /// with the previous check, which may end the run as converged. Once
    /// `num_iters` passes have run, the next call ends the run as
    /// exhausted. Calls on a finished run return the terminal status.
    ///
    /// # Errors
    ///
    /// Returns an error if a voxel update is not finite or a
    /// reinitialization fails. The field is left as it was before the
    /// failing pass.
    pub fn iterate(&mut self) -> LevelSetResult<EvolutionStatus> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }

        if self.iteration > 0 && self.iteration % self.params.check_freq == 0 {
            if self.since_reinit > 0 {
                self.reinitialize()?;
            }
            let check = self.monitor.evaluate(self.field.current());
            self.monitor.record(&self.band);
            if check.converged {
                self.status = EvolutionStatus::Converged {
                    iteration: self.iteration,
                    flip_ratio: check.ratio,
                };
                info!(
                    iteration = self.iteration,
                    flip_ratio = check.ratio,
                    "Level set converged"
                );
                return Ok(self.status);
            }
        }

        if self.iteration >= self.params.num_iters {
            self.status = EvolutionStatus::IterationBudgetExhausted {
                iterations: self.iteration,
            };
            info!(iterations = self.iteration, "Iteration budget exhausted");
            return Ok(self.status);
        }

        if self.since_reinit >= self.params.reinit_freq {
            self.reinitialize()?;
        }

        let stats = self.evolve()?;
        self.iteration += 1;
        self.last_stats = Some(stats);
        if stats.touched {
            debug!(iteration = self.iteration, "Band sentinel crossed zero");
            self.reinitialize()?;
        } else {
            self.since_reinit += 1;
        }
        Ok(self.status)
    }

    /// Iterate until the run ends, then finalize.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`iterate`](Self::iterate) or
    /// [`finalize`](Self::finalize).
    pub fn run(mut self) -> LevelSetResult<SegmentationResult> {
        while !self.iterate()?.is_terminal() {}
        self.finalize()
    }

    /// Run a final distance pass and hand the field to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the final reinitialization fails.
    pub fn finalize(mut self) -> LevelSetResult<SegmentationResult> {
        self.redistance()?;
        let skeleton = self.distance.skeleton().map(<[bool]>::to_vec);
        let field = ScalarVolume::new(self.geometry, self.field.into_current())?;
        info!(
            iterations = self.iteration,
            status = ?self.status,
            inside = field.count_inside(),
            "Segmentation finished"
        );
        Ok(SegmentationResult {
            field,
            status: self.status,
            iterations: self.iteration,
            warnings: self.warnings,
            last_stats: self.last_stats,
            skeleton,
        })
    }

    /// Replace the parameters.
    ///
    /// Every parameter-derived structure is rebuilt and the field is
    /// reinitialized; the iteration count is kept and the run resumes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `params` is invalid for the current
    /// input, leaving the engine unchanged.
    pub fn reconfigure(&mut self, params: EvolutionParams) -> LevelSetResult<()> {
        params.validate()?;
        self.input.validate(&params)?;

        let prepared = params.intensity.apply(self.input.intensity.values());
        let terms = prepare_terms(&self.geometry, &params, &self.input, &prepared)?;
        let scheduler = ThreadScheduler::new(params.threads)?;
        let distance = DistanceMapEngine::new(
            self.geometry,
            params.distance_strategy,
            params.distance_params(),
        )?;

        self.terms = terms;
        self.scheduler = scheduler;
        self.distance = distance;
        self.builder = band_builder(self.geometry, &params);
        self.band = self.builder.empty_band();
        self.monitor = ConvergenceMonitor::new(params.converged_threshold, params.flip_direction);
        self.field.set_limit(params.field_limit());
        self.params = params;
        self.status = EvolutionStatus::Running;

        info!(iteration = self.iteration, "Level-set engine reconfigured");
        self.reinitialize()?;
        self.monitor.record(&self.band);
        Ok(())
    }

    /// Rebuild the field as a signed distance and rebuild the band.
    fn reinitialize(&mut self) -> LevelSetResult<()> {
        self.redistance()?;
        self.field.sync_next();
        self.builder.rebuild(self.field.current(), &mut self.band);
        self.since_reinit = 0;
        debug!(
            iteration = self.iteration,
            band = self.band.len(),
            "Level set reinitialized"
        );
        Ok(())
    }

    fn redistance(&mut self) -> LevelSetResult<()> {
        let tube = if self.params.distance_strategy.uses_tube() {
            self.builder.rebuild(self.field.current(), &mut self.band);
            Some(self.band.tube())
        } else {
            None
        };
        let (current, next) = self.field.split();
        let report = self.distance.reinitialize(current, next, tube.as_deref())?;
        if report.empty_crossing {
            warn!(iteration = self.iteration, "Segmentation is empty or fills the volume");
            self.warnings.push(EngineWarning::EmptySegmentation {
                iteration: self.iteration,
            });
        }
        self.field.swap();
        Ok(())
    }

    fn evolve(&mut self) -> LevelSetResult<IterationStats> {
        let indices = self.band.indices();
        self.updates.clear();
        self.updates.resize(indices.len(), 0.0);

        let evolver = PdeEvolver::new(
            &self.geometry,
            &self.params,
            &self.terms,
            self.field.current(),
            self.band.flags(),
        );
        let totals = self
            .scheduler
            .run(indices, &mut self.updates, |range, out| {
                evolver.evolve_range(range, out)
            })?
            .into_iter()
            .fold(PassTotals::default(), PassTotals::merge);

        let (_, next) = self.field.split();
        for (&index, &value) in indices.iter().zip(&self.updates) {
            next[index] = value;
        }
        self.field.swap();

        let stats = totals.stats();
        debug!(
            iteration = self.iteration,
            band = stats.band_voxels,
            curvature = stats.mean_curvature,
            advection = stats.mean_advection,
            balloon = stats.mean_balloon,
            velocity = stats.mean_velocity,
            "Evolution pass"
        );
        Ok(stats)
    }
}

fn band_builder(geometry: VolumeGeometry, params: &EvolutionParams) -> NarrowBandBuilder {
    NarrowBandBuilder::new(
        geometry,
        params.band,
        params.tube,
        params.distance_strategy.uses_tube(),
    )
}

/// Resolve the force terms once per run.
fn prepare_terms(
    geometry: &VolumeGeometry,
    params: &EvolutionParams,
    input: &SegmentationInput,
    prepared: &PreparedIntensity,
) -> LevelSetResult<ForceTerms> {
    let vectors = || {
        input
            .advection_field
            .clone()
            .unwrap_or_else(|| attachment_vectors(geometry, &prepared.values))
    };
    let advection = if params.has_advection() {
        match params.advection_scheme {
            AdvectionScheme::Upwind => Advection::Upwind(vectors()),
            AdvectionScheme::Central => Advection::Central(vectors()),
            AdvectionScheme::Morphological => Advection::Morphological(morphological_field(
                geometry,
                &prepared.values,
                params.histogram_gradient_threshold,
            )?),
        }
    } else {
        Advection::Disabled
    };

    let image_gradient = (params.cosine_weighting && params.has_advection())
        .then(|| image_gradient(geometry, &prepared.values));

    let balloon = if params.balloon_coeff == 0.0 {
        None
    } else if let Some(map) = &input.balloon_map {
        Some(map.clone())
    } else {
        params
            .intensity_model
            .as_ref()
            .map(|model| balloon_speeds(model, prepared))
    };

    let velocity = if params.coeff_velocity == 0.0 {
        None
    } else {
        input.velocity_field.clone()
    };

    Ok(ForceTerms {
        advection,
        image_gradient,
        balloon,
        velocity,
        curvature_weight: input.curvature_weight.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::SeedSphere;
    use crate::intensity::IntensityPreprocessing;
    use nalgebra::Point3;
    use segment_distance::DistanceStrategy;

    fn disk_input(dims: [usize; 3]) -> SegmentationInput {
        let geometry = VolumeGeometry::isotropic(dims).unwrap();
        let image = ScalarVolume::filled(geometry, 50.0);
        let center = Point3::new((dims[0] / 2) as f64, (dims[1] / 2) as f64, (dims[2] / 2) as f64);
        SegmentationInput::new(image, Initialization::seeds(vec![SeedSphere::new(center, 4.0)]))
    }

    fn curvature_only() -> EvolutionParams {
        EvolutionParams::default()
            .advection(0.0, AdvectionScheme::Upwind)
            .curvature(1.0)
            .num_iters(12)
    }

    #[test]
    fn test_grid_too_small() {
        let err = LevelSetEngine::new(disk_input([2, 8, 1]), curvature_only()).unwrap_err();
        assert!(matches!(err, LevelSetError::GridTooSmall { x: 2, .. }));
        let err = LevelSetEngine::new(disk_input([8, 8, 2]), curvature_only()).unwrap_err();
        assert!(matches!(err, LevelSetError::GridTooSmall { z: 2, .. }));
    }

    #[test]
    fn test_missing_seeds() {
        let geometry = VolumeGeometry::isotropic([8, 8, 8]).unwrap();
        let input = SegmentationInput::new(
            ScalarVolume::filled(geometry, 0.0),
            Initialization::seeds(Vec::new()),
        );
        let err = LevelSetEngine::new(input, curvature_only()).unwrap_err();
        assert!(matches!(err, LevelSetError::MissingSeeds));
    }

    #[test]
    fn test_balloon_needs_a_source() {
        let params = curvature_only().balloon(1.0);
        let err = LevelSetEngine::new(disk_input([16, 16, 1]), params.clone()).unwrap_err();
        assert!(err.is_configuration());

        let input = disk_input([16, 16, 1]).with_balloon_map(vec![1.0; 256]);
        assert!(LevelSetEngine::new(input, params).is_ok());
    }

    #[test]
    fn test_length_mismatch() {
        let input = disk_input([16, 16, 1]).with_curvature_weight(vec![1.0; 10]);
        let err = LevelSetEngine::new(input, curvature_only()).unwrap_err();
        assert!(matches!(
            err,
            LevelSetError::LengthMismatch {
                what: "curvature weight",
                expected: 256,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_initial_field_is_reinitialized() {
        let engine = LevelSetEngine::new(disk_input([24, 24, 1]), curvature_only()).unwrap();
        let limit = engine.params().field_limit();
        assert!(engine.field().iter().all(|v| v.abs() <= limit));
        assert!(!engine.band().is_empty());
        assert_eq!(engine.iteration(), 0);
        assert_eq!(engine.status(), EvolutionStatus::Running);
    }

    #[test]
    fn test_budget_exhausted() {
        let mut engine = LevelSetEngine::new(disk_input([24, 24, 1]), curvature_only()).unwrap();
        let mut status = EvolutionStatus::Running;
        let mut calls = 0;
        while !status.is_terminal() {
            status = engine.iterate().unwrap();
            calls += 1;
        }
        assert_eq!(status, EvolutionStatus::IterationBudgetExhausted { iterations: 12 });
        assert_eq!(calls, 13);
        assert_eq!(engine.iterate().unwrap(), status);
        assert!(engine.last_stats().is_some());
    }

    #[test]
    fn test_curvature_shrinks_disk() {
        let engine = LevelSetEngine::new(disk_input([24, 24, 1]), curvature_only()).unwrap();
        let before = engine.field().iter().filter(|v| **v <= 0.0).count();
        let result = engine.run().unwrap();
        assert!(result.inside_voxels() < before);
        assert!(result.warnings.is_empty());
        assert!(result.skeleton.is_none());
    }

    #[test]
    fn test_shape_strategy_returns_skeleton() {
        let params = curvature_only().distance_strategy(DistanceStrategy::Shape).num_iters(2);
        let result = LevelSetEngine::new(disk_input([24, 24, 1]), params)
            .unwrap()
            .run()
            .unwrap();
        assert!(result.skeleton.is_some());
    }

    #[test]
    fn test_empty_segmentation_warning() {
        let geometry = VolumeGeometry::isotropic([12, 12, 12]).unwrap();
        let input = SegmentationInput::new(
            ScalarVolume::filled(geometry, 10.0),
            Initialization::threshold(5.0),
        );
        let params = curvature_only().intensity(IntensityPreprocessing::raw());
        let engine = LevelSetEngine::new(input, params).unwrap();
        assert!(matches!(
            engine.warnings(),
            [EngineWarning::EmptySegmentation { iteration: 0 }, ..]
        ));
        // Uniformly inside: every voxel saturated at -(band + 1)
        assert!(engine.field().iter().all(|v| (*v + 5.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_reconfigure() {
        let mut engine = LevelSetEngine::new(disk_input([24, 24, 1]), curvature_only()).unwrap();
        for _ in 0..3 {
            engine.iterate().unwrap();
        }
        let err = engine.reconfigure(curvature_only().tube(10.0)).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(engine.params().band, 4.0);

        engine.reconfigure(curvature_only().band(6.0).tube(3.0)).unwrap();
        assert_eq!(engine.iteration(), 3);
        assert!(engine.field().iter().all(|v| v.abs() <= 7.0));
        assert!(engine.field().iter().any(|v| *v > 5.0));
    }

    #[test]
    fn test_stats_reported() {
        let input = disk_input([24, 24, 1]).with_balloon_map(vec![1.0; 576]);
        let params = curvature_only().curvature(0.0).balloon(1.0).num_iters(1);
        let mut engine = LevelSetEngine::new(input, params).unwrap();
        engine.iterate().unwrap();
        let stats = engine.last_stats().unwrap();
        assert_eq!(stats.band_voxels, engine.band().len());
        assert!(stats.mean_balloon > 0.0);
        assert!(stats.mean_curvature.abs() < f32::EPSILON);
    }
}
