//! Narrow-band construction.

use segment_distance::TubeVoxel;
use segment_types::{VolumeGeometry, VoxelFlags};
use tracing::debug;

/// Distance from the tube boundary within which tube voxels are "front".
const TUBE_FRONT_WIDTH: f32 = 1.8;

/// Capacity growth step as a fraction of the voxel count.
const GROWTH_FRACTION: f64 = 0.15;

/// Active voxels of one band epoch.
///
/// Holds the band indices in scan order, the field values recorded when the
/// band was built, and the flags of every voxel of the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrowBand {
    indices: Vec<usize>,
    values: Vec<f32>,
    flags: Vec<VoxelFlags>,
}

impl NarrowBand {
    /// Band voxel indices in scan order.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Field values recorded at construction, aligned with [`indices`](Self::indices).
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Flags of every voxel of the grid.
    #[must_use]
    pub fn flags(&self) -> &[VoxelFlags] {
        &self.flags
    }

    /// Number of band voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the band is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Allocated index capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.indices.capacity()
    }

    /// Tube voxels, for front-propagation reinitialization.
    #[must_use]
    pub fn tube(&self) -> Vec<TubeVoxel> {
        self.indices
            .iter()
            .filter(|&&index| self.flags[index].contains(VoxelFlags::IN_TUBE))
            .map(|&index| TubeVoxel {
                index,
                front: self.flags[index].contains(VoxelFlags::TUBE_FRONT),
            })
            .collect()
    }
}

/// Position of a band voxel relative to the tube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BandClass {
    NegativeSentinel,
    PositiveSentinel,
    Inner,
}

impl BandClass {
    fn of(value: f32, tube: f32) -> Self {
        if value < -tube {
            Self::NegativeSentinel
        } else if value > tube {
            Self::PositiveSentinel
        } else {
            Self::Inner
        }
    }
}

/// Scans a field and produces its narrow band.
///
/// The one-voxel border (z border excluded on planar grids) never enters
/// the band, so evolution stencils need no bounds checks.
///
/// # Example
///
/// ```
/// use segment_levelset::NarrowBandBuilder;
/// use segment_types::VolumeGeometry;
///
/// let geometry = VolumeGeometry::isotropic([16, 16, 1]).unwrap();
/// let field: Vec<f32> = (0..geometry.len())
///     .map(|i| (geometry.coords(i)[0] as f32 - 7.5).clamp(-5.0, 5.0))
///     .collect();
///
/// let builder = NarrowBandBuilder::new(geometry, 4.0, 2.0, false);
/// let mut band = builder.empty_band();
/// builder.rebuild(&field, &mut band);
///
/// // Columns 4..=11 lie within 4 of the crossing, rows 1..=14 are interior
/// assert_eq!(band.len(), 8 * 14);
/// ```
#[derive(Debug, Clone)]
pub struct NarrowBandBuilder {
    geometry: VolumeGeometry,
    band: f32,
    tube: f32,
    track_tube: bool,
    growth: usize,
}

impl NarrowBandBuilder {
    /// Create a builder. `track_tube` adds the tube flags used by
    /// front-propagation reinitialization.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn new(geometry: VolumeGeometry, band: f32, tube: f32, track_tube: bool) -> Self {
        let growth = ((geometry.len() as f64 * GROWTH_FRACTION).ceil() as usize).max(1);
        Self {
            geometry,
            band,
            tube,
            track_tube,
            growth,
        }
    }

    /// An empty band with the initial capacity reserved.
    #[must_use]
    pub fn empty_band(&self) -> NarrowBand {
        NarrowBand {
            indices: Vec::with_capacity(self.growth),
            values: Vec::with_capacity(self.growth),
            flags: vec![VoxelFlags::empty(); self.geometry.len()],
        }
    }

    /// Rebuild `band` from `field`, replacing its contents.
    ///
    /// Capacity grows in steps of 15% of the voxel count and is never
    /// released.
    pub fn rebuild(&self, field: &[f32], band: &mut NarrowBand) {
        band.indices.clear();
        band.values.clear();
        band.flags.clear();
        band.flags.resize(self.geometry.len(), VoxelFlags::empty());

        let [tx, ty, _] = self.geometry.dims();
        for z in self.geometry.interior_z() {
            for y in 1..ty.saturating_sub(1) {
                for x in 1..tx.saturating_sub(1) {
                    let index = self.geometry.index(x, y, z);
                    let value = field[index];
                    if value.abs() > self.band {
                        continue;
                    }
                    band.flags[index] = self.classify(value);
                    if band.indices.len() == band.indices.capacity() {
                        band.indices.reserve_exact(self.growth);
                        band.values.reserve_exact(self.growth);
                        debug!(
                            capacity = band.indices.capacity(),
                            "Narrow band capacity grown"
                        );
                    }
                    band.indices.push(index);
                    band.values.push(value);
                }
            }
        }
    }

    fn classify(&self, value: f32) -> VoxelFlags {
        match BandClass::of(value, self.tube) {
            BandClass::NegativeSentinel => VoxelFlags::IN_BAND | VoxelFlags::NEG_MINE,
            BandClass::PositiveSentinel => VoxelFlags::IN_BAND | VoxelFlags::POS_MINE,
            BandClass::Inner if self.track_tube => {
                let mut flags = VoxelFlags::IN_BAND | VoxelFlags::IN_TUBE;
                if value.abs() >= self.tube - TUBE_FRONT_WIDTH {
                    flags |= VoxelFlags::TUBE_FRONT;
                }
                flags
            }
            BandClass::Inner => VoxelFlags::IN_BAND,
        }
    }
}
