//! Front-propagation reinitialization.
//!
//! The zero level set is advanced with unit speed in pseudo-time, once
//! outward and once inward, using an upwind scheme restricted to the tube
//! plus a neighbourhood of the tube front. The distance of a voxel is the
//! interpolated time at which its value changes sign.

// Pseudo-time bookkeeping mixes f64 arithmetic with f32 storage
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use segment_types::{VolumeGeometry, VoxelFlags};

use crate::params::{DistanceParams, MIN_MAGNITUDE};

/// Distance from the tube boundary below which a tube voxel is on the front.
const FRONT_WIDTH: f32 = 1.8;

/// Half-extent of the neighbourhood added around tube-front voxels.
const FRONT_REACH: usize = 4;

/// A voxel of the front-propagation tube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TubeVoxel {
    /// Linear voxel index.
    pub index: usize,
    /// Whether the voxel lies near the tube boundary.
    pub front: bool,
}

impl TubeVoxel {
    /// Classify a voxel with field value `value` against a tube of half-width
    /// `tube`. Returns `None` outside the tube.
    #[must_use]
    pub fn classify(index: usize, value: f32, tube: f32) -> Option<Self> {
        (value.abs() <= tube).then(|| Self {
            index,
            front: value.abs() >= tube - FRONT_WIDTH,
        })
    }
}

/// Collect the tube of half-width `tube` over the whole volume.
#[must_use]
pub fn tube_from_field(field: &[f32], tube: f32) -> Vec<TubeVoxel> {
    field
        .iter()
        .enumerate()
        .filter_map(|(index, &value)| TubeVoxel::classify(index, value, tube))
        .collect()
}

/// Which side of the crossing is being solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Outside,
    Inside,
}

impl Side {
    fn owns(self, value: f32) -> bool {
        match self {
            Self::Outside => value > 0.0,
            Self::Inside => value < 0.0,
        }
    }
}

/// Rebuild `output` by front propagation through `tube`.
///
/// Returns the number of voxels that received an arrival time.
pub(crate) fn front_propagation(
    geometry: &VolumeGeometry,
    input: &[f32],
    tube: &[TubeVoxel],
    params: &DistanceParams,
    output: &mut [f32],
) -> usize {
    let far = params.far_value();
    for (out, &value) in output.iter_mut().zip(input) {
        *out = if value == 0.0 { 0.0 } else { far.copysign(value) };
    }

    let mut flags = vec![VoxelFlags::empty(); input.len()];
    let mut times = input.to_vec();
    let mut next_times = input.to_vec();
    let mut reached = 0;

    for side in [Side::Outside, Side::Inside] {
        flags.fill(VoxelFlags::empty());
        let (members, pending) = collect_members(geometry, input, tube, side, &mut flags);

        times.copy_from_slice(input);
        next_times.copy_from_slice(input);
        let mut seen = 0;
        let dt = f64::from(params.init_dt);

        for step in 0..=params.max_front_steps() {
            if seen >= pending {
                break;
            }
            for &p in &members {
                let [x, y, z] = geometry.coords(p);
                let offsets = geometry.neighbor_offsets(x, y, z);
                let spacing = geometry.spacing();
                let u0 = f64::from(times[p]);

                let mut squared = 0.0;
                for axis in 0..3 {
                    if offsets.plus[axis] == 0 {
                        continue;
                    }
                    let h = spacing[axis];
                    let forward = (f64::from(times[geometry.offset(p, offsets.plus[axis])]) - u0) / h;
                    let backward = (u0 - f64::from(times[geometry.offset(p, offsets.minus[axis])])) / h;
                    squared += match side {
                        Side::Outside => {
                            (if forward <= 0.0 { forward * forward } else { 0.0 })
                                + (if backward > 0.0 { backward * backward } else { 0.0 })
                        }
                        Side::Inside => {
                            (if forward > 0.0 { forward * forward } else { 0.0 })
                                + (if backward <= 0.0 { backward * backward } else { 0.0 })
                        }
                    };
                }
                let speed = squared.sqrt();
                let updated = match side {
                    Side::Outside => u0 - dt * speed,
                    Side::Inside => u0 + dt * speed,
                };
                next_times[p] = updated as f32;

                if flags[p].contains(VoxelFlags::TIME_MINE) && !side.owns(next_times[p]) {
                    let arrival = dt * (step as f64 + u0 / (u0 - updated));
                    let magnitude = (arrival as f32).clamp(MIN_MAGNITUDE, far);
                    output[p] = match side {
                        Side::Outside => magnitude,
                        Side::Inside => -magnitude,
                    };
                    flags[p].remove(VoxelFlags::TIME_MINE);
                    seen += 1;
                }
            }
            std::mem::swap(&mut times, &mut next_times);
        }
        reached += seen;
    }
    reached
}

/// Tube voxels plus the neighbourhood of front voxels on `side`.
///
/// Voxels of `side` are marked `TIME_MINE`; returns the member list and the
/// number of marked voxels.
fn collect_members(
    geometry: &VolumeGeometry,
    input: &[f32],
    tube: &[TubeVoxel],
    side: Side,
    flags: &mut [VoxelFlags],
) -> (Vec<usize>, usize) {
    let dims = geometry.dims();
    let mut members = Vec::with_capacity(tube.len() * 2);
    let mut pending = 0;

    let mut admit = |index: usize, members: &mut Vec<usize>| {
        if flags[index].contains(VoxelFlags::IN_BAND) {
            return;
        }
        flags[index].insert(VoxelFlags::IN_BAND);
        if side.owns(input[index]) {
            flags[index].insert(VoxelFlags::TIME_MINE);
            pending += 1;
        }
        members.push(index);
    };

    for voxel in tube {
        admit(voxel.index, &mut members);
    }
    for voxel in tube {
        if !voxel.front || !side.owns(input[voxel.index]) {
            continue;
        }
        let coords = geometry.coords(voxel.index);
        let window = |axis: usize| {
            if dims[axis] == 1 {
                0..1
            } else {
                coords[axis].saturating_sub(FRONT_REACH)..(coords[axis] + FRONT_REACH).min(dims[axis])
            }
        };
        for z in window(2) {
            for y in window(1) {
                for x in window(0) {
                    admit(geometry.index(x, y, z), &mut members);
                }
            }
        }
    }
    (members, pending)
}
