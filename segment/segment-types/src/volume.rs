//! Dense scalar volumes.

use crate::error::{VolumeError, VolumeResult};
use crate::geometry::VolumeGeometry;

/// A dense `f32` volume.
///
/// Values are stored in the order defined by [`VolumeGeometry::index`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarVolume {
    geometry: VolumeGeometry,
    values: Vec<f32>,
}

impl ScalarVolume {
    /// Wrap an existing value buffer.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::LengthMismatch`] if the buffer length differs
    /// from the voxel count.
    pub fn new(geometry: VolumeGeometry, values: Vec<f32>) -> VolumeResult<Self> {
        if values.len() != geometry.len() {
            return Err(VolumeError::LengthMismatch {
                expected: geometry.len(),
                actual: values.len(),
            });
        }
        Ok(Self { geometry, values })
    }

    /// Create a volume filled with a constant.
    #[must_use]
    pub fn filled(geometry: VolumeGeometry, value: f32) -> Self {
        Self {
            geometry,
            values: vec![value; geometry.len()],
        }
    }

    /// Create a volume by evaluating `f` at every voxel.
    #[must_use]
    pub fn from_fn(geometry: VolumeGeometry, mut f: impl FnMut(usize, usize, usize) -> f32) -> Self {
        let [tx, ty, tz] = geometry.dims();
        let mut values = Vec::with_capacity(geometry.len());
        for z in 0..tz {
            for y in 0..ty {
                for x in 0..tx {
                    values.push(f(x, y, z));
                }
            }
        }
        Self { geometry, values }
    }

    /// Volume geometry.
    #[must_use]
    pub const fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// Number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the volume has no voxels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at (x, y, z), or `None` outside the volume.
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        self.geometry
            .contains(x, y, z)
            .then(|| self.values[self.geometry.index(x, y, z)])
    }

    /// All values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// All values, mutably.
    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Consume the volume and return its buffer.
    #[must_use]
    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    /// Smallest and largest value.
    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        self.values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Number of voxels with a value `<= 0`.
    #[must_use]
    pub fn count_inside(&self) -> usize {
        self.values.iter().filter(|v| **v <= 0.0).count()
    }
}
