//! Volume dimensions, spacing and linear indexing.

use std::ops::Range;

use nalgebra::Vector3;

use crate::error::{VolumeError, VolumeResult};

/// Dimensions and voxel spacing of a volume.
///
/// Voxels are stored with x varying fastest, then y, then z. A geometry
/// with a single z slice is planar.
///
/// # Example
///
/// ```
/// use segment_types::{Vector3, VolumeGeometry};
///
/// let geometry = VolumeGeometry::new([8, 6, 4], Vector3::new(1.0, 1.0, 2.5)).unwrap();
/// let index = geometry.index(2, 3, 1);
/// assert_eq!(geometry.coords(index), [2, 3, 1]);
/// assert!(!geometry.is_isotropic());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGeometry {
    /// Voxel counts (tx, ty, tz).
    dims: [usize; 3],
    /// Physical voxel size along each axis.
    spacing: Vector3<f64>,
}

/// Linear offsets to the six axis neighbours of a voxel.
///
/// At the volume border the missing neighbour is reflected onto the
/// opposite side, so `minus` and `plus` always address valid voxels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborOffsets {
    /// Offsets towards decreasing x, y, z.
    pub minus: [isize; 3],
    /// Offsets towards increasing x, y, z.
    pub plus: [isize; 3],
}

impl VolumeGeometry {
    /// Create a geometry from dimensions and spacing.
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension is zero or any spacing component is
    /// not finite and positive.
    pub fn new(dims: [usize; 3], spacing: Vector3<f64>) -> VolumeResult<Self> {
        if dims.contains(&0) {
            return Err(VolumeError::InvalidDimensions {
                x: dims[0],
                y: dims[1],
                z: dims[2],
            });
        }
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(VolumeError::InvalidSpacing {
                x: spacing.x,
                y: spacing.y,
                z: spacing.z,
            });
        }
        Ok(Self { dims, spacing })
    }

    /// Create a geometry with unit spacing.
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension is zero.
    pub fn isotropic(dims: [usize; 3]) -> VolumeResult<Self> {
        Self::new(dims, Vector3::new(1.0, 1.0, 1.0))
    }

    /// Voxel counts (tx, ty, tz).
    #[must_use]
    pub const fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Physical voxel size.
    #[must_use]
    pub const fn spacing(&self) -> Vector3<f64> {
        self.spacing
    }

    /// Total number of voxels.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Always false; a geometry has at least one voxel.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the volume is a single slice.
    #[must_use]
    pub const fn is_planar(&self) -> bool {
        self.dims[2] == 1
    }

    /// Whether all spacing components are equal.
    #[must_use]
    pub fn is_isotropic(&self) -> bool {
        let s = self.spacing;
        (s.x - s.y).abs() <= f64::EPSILON * s.x && (s.x - s.z).abs() <= f64::EPSILON * s.x
    }

    /// Linear strides along x, y and z.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // voxel counts fit in isize
    pub const fn strides(&self) -> [isize; 3] {
        let [tx, ty, _] = self.dims;
        [1, tx as isize, (tx * ty) as isize]
    }

    /// Linear index of voxel (x, y, z).
    #[must_use]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(self.contains(x, y, z), "voxel ({x}, {y}, {z}) out of range");
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    /// Coordinates of a linear index.
    #[must_use]
    pub const fn coords(&self, index: usize) -> [usize; 3] {
        let [tx, ty, _] = self.dims;
        [index % tx, (index / tx) % ty, index / (tx * ty)]
    }

    /// Whether (x, y, z) lies inside the volume.
    #[must_use]
    pub const fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.dims[0] && y < self.dims[1] && z < self.dims[2]
    }

    /// Whether (x, y, z) is away from the one-voxel border.
    ///
    /// The z border is ignored for planar volumes.
    #[must_use]
    pub const fn is_interior(&self, x: usize, y: usize, z: usize) -> bool {
        let [tx, ty, tz] = self.dims;
        let xy = x >= 1 && x + 1 < tx && y >= 1 && y + 1 < ty;
        xy && (tz == 1 || (z >= 1 && z + 1 < tz))
    }

    /// Range of z slices away from the border.
    #[must_use]
    pub const fn interior_z(&self) -> Range<usize> {
        if self.is_planar() {
            0..1
        } else {
            1..self.dims[2].saturating_sub(1)
        }
    }

    /// Apply a linear offset to an index.
    #[must_use]
    pub fn offset(&self, index: usize, delta: isize) -> usize {
        let moved = index.wrapping_add_signed(delta);
        debug_assert!(
            index.checked_add_signed(delta).is_some_and(|i| i < self.len()),
            "offset {delta} from voxel {index} leaves the volume"
        );
        moved
    }

    /// Axis neighbour offsets of voxel (x, y, z), reflected at the border.
    #[must_use]
    pub const fn neighbor_offsets(&self, x: usize, y: usize, z: usize) -> NeighborOffsets {
        let strides = self.strides();
        let coords = [x, y, z];
        let mut minus = [0isize; 3];
        let mut plus = [0isize; 3];
        let mut axis = 0;
        while axis < 3 {
            let n = self.dims[axis];
            let stride = strides[axis];
            if n > 1 {
                let c = coords[axis];
                minus[axis] = if c == 0 { stride } else { -stride };
                plus[axis] = if c + 1 == n { -stride } else { stride };
            }
            axis += 1;
        }
        NeighborOffsets { minus, plus }
    }
}
