//! Double-buffered level-set field.

use std::mem;

/// The evolving field: a "current" buffer read by the evolution pass and a
/// "next" buffer it writes.
///
/// Every value stays within `±limit`. Outside the narrow band both buffers
/// hold the same values, so swapping after a band-only update never exposes
/// stale voxels.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSetField {
    current: Vec<f32>,
    next: Vec<f32>,
    limit: f32,
}

impl LevelSetField {
    /// Wrap initial values, clamping them to `±limit`.
    #[must_use]
    pub fn new(mut values: Vec<f32>, limit: f32) -> Self {
        for v in &mut values {
            *v = v.clamp(-limit, limit);
        }
        Self {
            next: values.clone(),
            current: values,
            limit,
        }
    }

    /// Saturation value.
    #[must_use]
    pub const fn limit(&self) -> f32 {
        self.limit
    }

    /// Restrict a value to `±limit`.
    #[must_use]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(-self.limit, self.limit)
    }

    /// Number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Whether the field has no voxels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Field values visible to readers.
    #[must_use]
    pub fn current(&self) -> &[f32] {
        &self.current
    }

    /// Buffer written by the next pass.
    #[must_use]
    pub fn next(&self) -> &[f32] {
        &self.next
    }

    /// Read "current" while writing "next".
    pub fn split(&mut self) -> (&[f32], &mut [f32]) {
        (&self.current, &mut self.next)
    }

    /// Exchange the buffers.
    pub fn swap(&mut self) {
        mem::swap(&mut self.current, &mut self.next);
    }

    /// Copy "current" into "next".
    pub fn sync_next(&mut self) {
        self.next.copy_from_slice(&self.current);
    }

    /// Change the saturation value and clamp both buffers to it.
    pub(crate) fn set_limit(&mut self, limit: f32) {
        self.limit = limit;
        for v in self.current.iter_mut().chain(self.next.iter_mut()) {
            *v = v.clamp(-limit, limit);
        }
    }

    /// Consume the field and return "current".
    #[must_use]
    pub fn into_current(self) -> Vec<f32> {
        self.current
    }
}
