//! Error types for distance reinitialization.

use segment_types::VolumeError;
use thiserror::Error;

/// Result type for distance operations.
pub type DistanceResult<T> = Result<T, DistanceError>;

/// Errors that can occur during distance reinitialization.
#[derive(Debug, Error)]
pub enum DistanceError {
    /// Invalid parameters provided.
    #[error("invalid distance parameters: {0}")]
    InvalidParams(String),

    /// A field does not match the volume geometry.
    #[error("{what} has {actual} voxels, volume has {expected}")]
    LengthMismatch {
        /// Which buffer was wrong.
        what: &'static str,
        /// Voxel count of the geometry.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },

    /// Volume construction failed.
    #[error("volume error: {0}")]
    Volume(#[from] VolumeError),
}

impl DistanceError {
    /// Create an invalid parameters error.
    #[must_use]
    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::InvalidParams(details.into())
    }
}
