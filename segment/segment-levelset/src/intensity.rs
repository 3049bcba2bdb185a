//! Intensity preprocessing and Gaussian intensity models.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{LevelSetError, LevelSetResult};

/// Upper end of the rescaled intensity range.
pub const RESCALED_MAX: f32 = 255.0;

/// Lookup table resolution: entries per rescaled intensity unit.
const LUT_RESOLUTION: f32 = 10.0;

/// Clamping and rescaling applied to the intensity grid once, before
/// evolution.
///
/// Steps run in this order: low clamp, logarithmic compression above the
/// high threshold, then linear rescale to `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntensityPreprocessing {
    /// Rescale intensities to `[0, 255]`.
    pub rescale: bool,

    /// Explicit `(min, max)` for the rescale instead of the data range.
    pub bounds: Option<(f32, f32)>,

    /// Intensities below this value are raised to it.
    pub low_threshold: Option<f32>,

    /// Intensities above this value are compressed logarithmically.
    pub high_threshold: Option<f32>,
}

impl Default for IntensityPreprocessing {
    fn default() -> Self {
        Self {
            rescale: true,
            bounds: None,
            low_threshold: None,
            high_threshold: None,
        }
    }
}

impl IntensityPreprocessing {
    /// Keep intensities untouched.
    #[must_use]
    pub const fn raw() -> Self {
        Self {
            rescale: false,
            bounds: None,
            low_threshold: None,
            high_threshold: None,
        }
    }

    /// Rescale using explicit bounds.
    #[must_use]
    pub const fn bounds(mut self, min: f32, max: f32) -> Self {
        self.bounds = Some((min, max));
        self
    }

    /// Set the low and high clamp thresholds.
    #[must_use]
    pub const fn thresholds(mut self, low: Option<f32>, high: Option<f32>) -> Self {
        self.low_threshold = low;
        self.high_threshold = high;
        self
    }

    /// Check the settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for non-finite or inverted values.
    pub fn validate(&self) -> LevelSetResult<()> {
        if let Some((min, max)) = self.bounds {
            if !min.is_finite() || !max.is_finite() || min >= max {
                return Err(LevelSetError::configuration(format!(
                    "rescale bounds must be finite with min < max, got ({min}, {max})"
                )));
            }
        }
        if let (Some(low), Some(high)) = (self.low_threshold, self.high_threshold) {
            if low > high {
                return Err(LevelSetError::configuration(format!(
                    "low threshold {low} above high threshold {high}"
                )));
            }
        }
        Ok(())
    }

    /// Apply clamping, compression and rescaling.
    #[must_use]
    pub fn apply(&self, values: &[f32]) -> PreparedIntensity {
        let mut prepared: Vec<f32> = values
            .iter()
            .map(|&v| {
                let mut v = v;
                if let Some(low) = self.low_threshold {
                    v = v.max(low);
                }
                if let Some(high) = self.high_threshold {
                    if v > high {
                        v = high + (1.0 + v - high).ln();
                    }
                }
                v
            })
            .collect();

        if !self.rescale {
            return PreparedIntensity {
                values: prepared,
                range: None,
            };
        }

        let (min, max) = self.bounds.unwrap_or_else(|| {
            prepared
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                })
        });
        let range = PreparedRange { min, max };
        for v in &mut prepared {
            *v = range.rescale(*v).clamp(0.0, RESCALED_MAX);
        }
        PreparedIntensity {
            values: prepared,
            range: Some(range),
        }
    }
}

/// Original intensity range mapped onto `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreparedRange {
    /// Original intensity mapped to 0.
    pub min: f32,
    /// Original intensity mapped to 255.
    pub max: f32,
}

impl PreparedRange {
    fn is_flat(self) -> bool {
        !(self.max - self.min > f32::EPSILON)
    }

    /// Map an original intensity into the rescaled range (unclamped).
    #[must_use]
    pub fn rescale(self, original: f32) -> f32 {
        if self.is_flat() {
            0.0
        } else {
            (original - self.min) / (self.max - self.min) * RESCALED_MAX
        }
    }

    /// Map a rescaled intensity back to original units.
    #[must_use]
    pub fn original(self, rescaled: f32) -> f32 {
        self.min + rescaled / RESCALED_MAX * (self.max - self.min)
    }
}

/// Intensity grid ready for evolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedIntensity {
    /// Preprocessed intensities.
    pub values: Vec<f32>,
    /// Original range when rescaling was applied.
    pub range: Option<PreparedRange>,
}

impl PreparedIntensity {
    /// Map an original-unit threshold into preprocessed units.
    #[must_use]
    pub fn threshold(&self, original: f32) -> f32 {
        self.range.map_or(original, |range| range.rescale(original))
    }
}

/// One Gaussian intensity class, in original intensity units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaussianClass {
    /// Mean intensity.
    pub mean: f32,
    /// Standard deviation.
    pub std_dev: f32,
}

impl GaussianClass {
    /// Create a class.
    #[must_use]
    pub const fn new(mean: f32, std_dev: f32) -> Self {
        Self { mean, std_dev }
    }

    fn likelihood(self, intensity: f32) -> f32 {
        let d = intensity - self.mean;
        (-(d * d) / (self.std_dev * self.std_dev)).exp()
    }
}

/// Summed Gaussian intensity model driving the balloon force.
///
/// The balloon speed at intensity `I` is
/// `min(1, Σ exp(-(I - μ)² / σ²)) - probability_threshold`, so voxels that
/// match a class expand and the rest contract.
///
/// # Example
///
/// ```
/// use segment_levelset::{GaussianClass, IntensityModel};
///
/// let model = IntensityModel::new(vec![GaussianClass::new(200.0, 20.0)]);
/// assert!((model.balloon_speed(200.0) - 0.7).abs() < 1e-6);
/// assert!(model.balloon_speed(20.0) < 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntensityModel {
    /// Intensity classes belonging to the structure.
    pub classes: Vec<GaussianClass>,

    /// Probability at which the balloon force changes sign.
    pub probability_threshold: f32,

    /// Intensities above this value always get full speed.
    pub high_threshold: Option<f32>,
}

impl IntensityModel {
    /// Create a model with the default probability threshold of 0.3.
    #[must_use]
    pub const fn new(classes: Vec<GaussianClass>) -> Self {
        Self {
            classes,
            probability_threshold: 0.3,
            high_threshold: None,
        }
    }

    /// Set the probability threshold.
    #[must_use]
    pub const fn probability_threshold(mut self, threshold: f32) -> Self {
        self.probability_threshold = threshold;
        self
    }

    /// Set the high threshold.
    #[must_use]
    pub const fn high_threshold(mut self, threshold: f32) -> Self {
        self.high_threshold = Some(threshold);
        self
    }

    /// Balloon speed at an original intensity.
    #[must_use]
    pub fn balloon_speed(&self, intensity: f32) -> f32 {
        if self.high_threshold.is_some_and(|high| intensity > high) {
            return 1.0;
        }
        let probability: f32 = self
            .classes
            .iter()
            .map(|class| class.likelihood(intensity))
            .sum();
        probability.min(1.0) - self.probability_threshold
    }

    /// Check the model.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty model or a class without a
    /// positive standard deviation.
    pub fn validate(&self) -> LevelSetResult<()> {
        if self.classes.is_empty() {
            return Err(LevelSetError::configuration(
                "intensity model needs at least one class",
            ));
        }
        for class in &self.classes {
            if !class.mean.is_finite() || !class.std_dev.is_finite() || class.std_dev <= 0.0 {
                return Err(LevelSetError::configuration(format!(
                    "invalid Gaussian class (mean {}, std_dev {})",
                    class.mean, class.std_dev
                )));
            }
        }
        if !self.probability_threshold.is_finite() {
            return Err(LevelSetError::configuration(
                "probability threshold must be finite",
            ));
        }
        Ok(())
    }
}

/// Balloon speeds tabulated over the rescaled intensity range.
#[derive(Debug, Clone)]
pub(crate) struct ProbabilityLut {
    table: Vec<f32>,
}

impl ProbabilityLut {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub(crate) fn new(model: &IntensityModel, range: PreparedRange) -> Self {
        let entries = (RESCALED_MAX * LUT_RESOLUTION) as usize + 1;
        let table = (0..entries)
            .map(|k| model.balloon_speed(range.original(k as f32 / LUT_RESOLUTION)))
            .collect();
        Self { table }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn lookup(&self, rescaled: f32) -> f32 {
        // Rescaled values are clamped to [0, 255]
        let index = ((rescaled.max(0.0) * LUT_RESOLUTION) as usize).min(self.table.len() - 1);
        self.table[index]
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }
}

/// Per-voxel balloon speeds from a model.
pub(crate) fn balloon_speeds(model: &IntensityModel, intensity: &PreparedIntensity) -> Vec<f32> {
    match intensity.range {
        Some(range) => {
            let lut = ProbabilityLut::new(model, range);
            intensity.values.iter().map(|&v| lut.lookup(v)).collect()
        }
        None => intensity
            .values
            .iter()
            .map(|&v| model.balloon_speed(v))
            .collect(),
    }
}
