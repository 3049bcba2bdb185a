//! Evolution status, statistics and results.

use segment_types::ScalarVolume;

/// Where the evolution stands.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EvolutionStatus {
    /// More iterations are allowed.
    #[default]
    Running,

    /// The flip ratio fell below the threshold.
    Converged {
        /// Iteration at which the check succeeded.
        iteration: usize,
        /// Flip ratio of the successful check.
        flip_ratio: f32,
    },

    /// The iteration budget ran out before convergence.
    IterationBudgetExhausted {
        /// Iterations run.
        iterations: usize,
    },
}

impl EvolutionStatus {
    /// Whether no more iterations will run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether the run converged.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Recoverable conditions raised during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineWarning {
    /// The field had no zero crossing at a reinitialization and was replaced
    /// by a uniform value.
    EmptySegmentation {
        /// Iteration at which it happened.
        iteration: usize,
    },
}

/// Summary of one evolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IterationStats {
    /// Voxels updated.
    pub band_voxels: usize,
    /// A sentinel voxel crossed zero.
    pub touched: bool,
    /// Mean curvature contribution.
    pub mean_curvature: f32,
    /// Mean advection contribution.
    pub mean_advection: f32,
    /// Mean balloon contribution.
    pub mean_balloon: f32,
    /// Mean velocity contribution.
    pub mean_velocity: f32,
}

/// Final output of a segmentation run.
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    /// Signed distance field; the segmentation is `field <= 0`.
    pub field: ScalarVolume,
    /// Terminal status.
    pub status: EvolutionStatus,
    /// Iterations run.
    pub iterations: usize,
    /// Warnings raised during the run.
    pub warnings: Vec<EngineWarning>,
    /// Statistics of the last evolution pass.
    pub last_stats: Option<IterationStats>,
    /// Inside skeleton from the final distance pass (shape strategy only).
    pub skeleton: Option<Vec<bool>>,
}

impl SegmentationResult {
    /// Number of voxels inside the segmentation.
    #[must_use]
    pub fn inside_voxels(&self) -> usize {
        self.field.count_inside()
    }
}
