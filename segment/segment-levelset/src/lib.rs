//! Narrow-band level-set evolution for volumetric segmentation.
//!
//! A segmentation is the region `u <= 0` of a signed distance field `u` over
//! a 2D or 3D image. The engine moves the zero level set under a weighted
//! sum of forces, updating only voxels close to the contour:
//!
//! - Curvature - Mean or smaller principal curvature smoothing
//! - Advection - Attraction towards image edges (upwind, central or
//!   morphological)
//! - Balloon - Region growing or shrinking from a per-voxel speed map or a
//!   Gaussian intensity model
//! - Velocity - An external vector field
//!
//! The field is periodically rebuilt as a signed distance by
//! [`segment_distance`], and the run stops once few voxels change sign
//! between two checks or when the iteration budget is spent.
//!
//! # Example
//!
//! ```
//! use segment_levelset::{
//!     EvolutionParams, GaussianClass, Initialization, IntensityModel, LevelSetEngine,
//!     SeedSphere, SegmentationInput,
//! };
//! use segment_types::{Point3, ScalarVolume, VolumeGeometry};
//!
//! // Bright square on a dark background
//! let geometry = VolumeGeometry::isotropic([32, 32, 1]).unwrap();
//! let image = ScalarVolume::from_fn(geometry, |x, y, _| {
//!     if (8..24).contains(&x) && (8..24).contains(&y) { 200.0 } else { 20.0 }
//! });
//!
//! let seeds = vec![SeedSphere::new(Point3::new(16.0, 16.0, 0.0), 3.0)];
//! let model = IntensityModel::new(vec![GaussianClass::new(200.0, 10.0)]);
//! let params = EvolutionParams::region_growing()
//!     .intensity_model(model)
//!     .num_iters(60);
//!
//! let input = SegmentationInput::new(image, Initialization::seeds(seeds));
//! let result = LevelSetEngine::new(input, params).unwrap().run().unwrap();
//!
//! // The contour grew from the seed but stayed inside the square
//! let inside = result.inside_voxels();
//! assert!(inside > 29 && inside <= 18 * 18);
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with no engine dependencies. It can be used in:
//! - Medical imaging pipelines
//! - Interactive segmentation tools
//! - Batch processing of volumetric scans

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod attachment;
mod band;
mod convergence;
mod engine;
mod error;
mod evolve;
mod init;
mod intensity;
mod params;
mod result;
mod scheduler;
mod state;

pub use band::{NarrowBand, NarrowBandBuilder};
pub use convergence::{ConvergenceCheck, ConvergenceMonitor};
pub use engine::{LevelSetEngine, SegmentationInput};
pub use error::{LevelSetError, LevelSetResult};
pub use init::{Initialization, IntensityStatistics, Polarity, SeedSphere, seed_statistics};
pub use intensity::{
    GaussianClass, IntensityModel, IntensityPreprocessing, PreparedIntensity, PreparedRange,
    RESCALED_MAX,
};
pub use params::{
    AdvectionScheme, BalloonScheme, CurvatureScheme, EvolutionParams, FlipDirection,
};
pub use result::{EngineWarning, EvolutionStatus, IterationStats, SegmentationResult};
pub use scheduler::ThreadScheduler;
pub use state::LevelSetField;

// Re-export the distance strategy selector used in `EvolutionParams`
pub use segment_distance::DistanceStrategy;
