//! Sign-flip convergence test.

use tracing::debug;

use crate::band::NarrowBand;
use crate::params::FlipDirection;

/// Outcome of one convergence check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceCheck {
    /// Recorded voxels whose sign flipped in the counted direction.
    pub flipped: usize,
    /// Number of recorded voxels compared.
    pub compared: usize,
    /// `flipped / compared`, zero when nothing was recorded.
    pub ratio: f32,
    /// Whether the ratio fell below the threshold.
    pub converged: bool,
}

/// Compares the field against the band recorded at the previous check.
///
/// Only flips in the configured [`FlipDirection`] are counted. The default,
/// [`FlipDirection::InsideToOutside`], ignores voxels that joined the
/// segmentation, so a steadily growing contour can look converged; growing
/// setups should count [`FlipDirection::OutsideToInside`] instead.
///
/// # Example
///
/// ```
/// use segment_levelset::{ConvergenceMonitor, FlipDirection, NarrowBandBuilder};
/// use segment_types::VolumeGeometry;
///
/// let geometry = VolumeGeometry::isotropic([12, 12, 1]).unwrap();
/// let field: Vec<f32> = (0..geometry.len())
///     .map(|i| geometry.coords(i)[0] as f32 - 5.5)
///     .collect();
/// let builder = NarrowBandBuilder::new(geometry, 4.0, 2.0, false);
/// let mut band = builder.empty_band();
/// builder.rebuild(&field, &mut band);
///
/// let mut monitor = ConvergenceMonitor::new(0.02, FlipDirection::InsideToOutside);
/// monitor.record(&band);
/// let check = monitor.evaluate(&field);
/// assert_eq!(check.flipped, 0);
/// assert!(check.converged);
/// ```
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    threshold: f32,
    direction: FlipDirection,
    snapshot: Vec<(usize, f32)>,
}

impl ConvergenceMonitor {
    /// Create a monitor.
    #[must_use]
    pub const fn new(threshold: f32, direction: FlipDirection) -> Self {
        Self {
            threshold,
            direction,
            snapshot: Vec::new(),
        }
    }

    /// Number of recorded voxels.
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.snapshot.len()
    }

    /// Record the band values for the next comparison.
    pub fn record(&mut self, band: &NarrowBand) {
        self.snapshot.clear();
        self.snapshot.extend(
            band.indices()
                .iter()
                .copied()
                .zip(band.values().iter().copied()),
        );
    }

    /// Compare the recorded values with `field`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // voxel counts
    pub fn evaluate(&self, field: &[f32]) -> ConvergenceCheck {
        let flipped = self
            .snapshot
            .iter()
            .filter(|&&(index, before)| self.direction.counts(before, field[index]))
            .count();
        let compared = self.snapshot.len();
        let ratio = if compared == 0 {
            0.0
        } else {
            flipped as f32 / compared as f32
        };
        let converged = ratio < self.threshold || compared == 0;
        debug!(flipped, compared, ratio, converged, "Convergence check");
        ConvergenceCheck {
            flipped,
            compared,
            ratio,
            converged,
        }
    }
}
