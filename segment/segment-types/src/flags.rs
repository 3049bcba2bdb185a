//! Per-voxel narrow-band flags.

bitflags::bitflags! {
    /// Narrow-band bookkeeping bits, one byte per voxel.
    ///
    /// Flags are recomputed wholesale whenever the narrow band is rebuilt and
    /// are never partially mutated between rebuilds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VoxelFlags: u8 {
        /// Voxel belongs to the active narrow band.
        const IN_BAND = 0b0000_0001;
        /// Outer sentinel on the negative (inside) side.
        const NEG_MINE = 0b0000_0010;
        /// Outer sentinel on the positive (outside) side.
        const POS_MINE = 0b0000_0100;
        /// Voxel still waiting for its arrival time during front propagation.
        const TIME_MINE = 0b0000_1000;
        /// Tube voxel close to the tube boundary.
        const TUBE_FRONT = 0b0010_0000;
        /// Voxel lies inside the front-propagation tube.
        const IN_TUBE = 0b0100_0000;
    }
}

impl VoxelFlags {
    /// Whether the voxel is one of the outer sentinels.
    ///
    /// A sentinel crossing zero means the front left the band.
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        self.intersects(Self::NEG_MINE.union(Self::POS_MINE))
    }

    /// Whether `value` flipped past the sentinel's side.
    #[must_use]
    pub fn is_touched_by(self, value: f32) -> bool {
        (self.contains(Self::NEG_MINE) && value >= 0.0)
            || (self.contains(Self::POS_MINE) && value <= 0.0)
    }
}
