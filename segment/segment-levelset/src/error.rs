//! Error types for level-set evolution.

use segment_distance::DistanceError;
use segment_types::VolumeError;
use thiserror::Error;

/// Result type for level-set operations.
pub type LevelSetResult<T> = Result<T, LevelSetError>;

/// Errors that can occur during level-set segmentation.
#[derive(Debug, Error)]
pub enum LevelSetError {
    /// Parameters are invalid or contradict each other.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Seed initialization was requested without any seed.
    #[error("seed initialization requires at least one seed")]
    MissingSeeds,

    /// A per-voxel input does not match the grid.
    #[error("{what} has {actual} voxels, grid has {expected}")]
    LengthMismatch {
        /// Which input was wrong.
        what: &'static str,
        /// Voxel count of the grid.
        expected: usize,
        /// Length of the supplied input.
        actual: usize,
    },

    /// Grid is too small for the finite-difference stencils.
    #[error("grid {x}x{y}x{z} too small: need at least 3 voxels per axis (or a single z slice)")]
    GridTooSmall {
        /// Voxels along x.
        x: usize,
        /// Voxels along y.
        y: usize,
        /// Voxels along z.
        z: usize,
    },

    /// A voxel update produced a non-finite value.
    #[error("non-finite update at voxel {index}")]
    NonFiniteUpdate {
        /// Linear index of the voxel.
        index: usize,
    },

    /// The worker pool could not be built.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Distance reinitialization failed.
    #[error("distance error: {0}")]
    Distance(#[from] DistanceError),

    /// Volume construction failed.
    #[error("volume error: {0}")]
    Volume(#[from] VolumeError),
}

impl LevelSetError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(details: impl Into<String>) -> Self {
        Self::Configuration(details.into())
    }

    /// Create a length mismatch error.
    #[must_use]
    pub const fn length_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            what,
            expected,
            actual,
        }
    }

    /// Whether the error was raised by parameter or input validation.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::MissingSeeds
                | Self::LengthMismatch { .. }
                | Self::GridTooSmall { .. }
        )
    }
}
