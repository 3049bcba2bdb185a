//! Error types for volume construction.

use thiserror::Error;

/// Result type for volume operations.
pub type VolumeResult<T> = Result<T, VolumeError>;

/// Errors that can occur when building volumes.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// One or more dimensions are zero.
    #[error("invalid volume dimensions: {x}x{y}x{z}")]
    InvalidDimensions {
        /// Voxels along x.
        x: usize,
        /// Voxels along y.
        y: usize,
        /// Voxels along z.
        z: usize,
    },

    /// Voxel spacing is not finite and positive.
    #[error("invalid voxel spacing: ({x}, {y}, {z})")]
    InvalidSpacing {
        /// Spacing along x.
        x: f64,
        /// Spacing along y.
        y: f64,
        /// Spacing along z.
        z: f64,
    },

    /// Value buffer does not match the voxel count.
    #[error("value buffer has {actual} entries, volume has {expected} voxels")]
    LengthMismatch {
        /// Voxel count of the geometry.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },
}
