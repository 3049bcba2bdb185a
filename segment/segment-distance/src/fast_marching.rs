//! Fast marching reinitialization.
//!
//! Solves the Eikonal equation `|∇T| = 1` outward from the iso-contour seeds
//! in increasing distance order, stopping once the band is covered. The
//! sign of the input is reapplied afterwards.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use segment_types::VolumeGeometry;

use crate::iso_contour::IsoContour;
use crate::params::{DistanceParams, MIN_MAGNITUDE};

/// Slack added to the band so voxels exactly at the band edge are accepted.
const BAND_SLACK: f32 = 1e-3;

/// Entry in a min-heap of tentative distances.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Trial {
    /// Voxel index.
    pub index: usize,
    /// Tentative unsigned distance.
    pub distance: f32,
}

impl PartialEq for Trial {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && (self.distance - other.distance).abs() < f32::EPSILON
    }
}

impl Eq for Trial {}

impl PartialOrd for Trial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Trial {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Far,
    Trial,
    Known,
}

struct Marcher<'a> {
    geometry: &'a VolumeGeometry,
    distance: Vec<f32>,
    status: Vec<Status>,
    heap: BinaryHeap<Trial>,
}

impl Marcher<'_> {
    fn push_neighbors(&mut self, index: usize) {
        let dims = self.geometry.dims();
        let strides = self.geometry.strides();
        let coords = self.geometry.coords(index);
        for axis in 0..3 {
            if coords[axis] > 0 {
                self.try_update(self.geometry.offset(index, -strides[axis]));
            }
            if coords[axis] + 1 < dims[axis] {
                self.try_update(self.geometry.offset(index, strides[axis]));
            }
        }
    }

    fn try_update(&mut self, index: usize) {
        if self.status[index] == Status::Known {
            return;
        }
        let Some(candidate) = self.solve(index) else {
            return;
        };
        if candidate < self.distance[index] {
            self.distance[index] = candidate;
            self.status[index] = Status::Trial;
            self.heap.push(Trial {
                index,
                distance: candidate,
            });
        }
    }

    /// Upwind Eikonal update from the accepted neighbours of `index`.
    #[allow(clippy::cast_possible_truncation)]
    fn solve(&self, index: usize) -> Option<f32> {
        let dims = self.geometry.dims();
        let strides = self.geometry.strides();
        let spacing = self.geometry.spacing();
        let coords = self.geometry.coords(index);

        let mut terms: [(f64, f64); 3] = [(0.0, 0.0); 3];
        let mut count = 0;
        for axis in 0..3 {
            let mut best = f64::INFINITY;
            if coords[axis] > 0 {
                best = best.min(self.known(self.geometry.offset(index, -strides[axis])));
            }
            if coords[axis] + 1 < dims[axis] {
                best = best.min(self.known(self.geometry.offset(index, strides[axis])));
            }
            if best.is_finite() {
                terms[count] = (best, spacing[axis]);
                count += 1;
            }
        }
        if count == 0 {
            return None;
        }
        let terms = &mut terms[..count];
        terms.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let mut t = terms[0].0 + terms[0].1;
        for k in 2..=count {
            if t <= terms[k - 1].0 {
                break;
            }
            let (mut a, mut b, mut c) = (0.0, 0.0, -1.0);
            for &(value, h) in &terms[..k] {
                let w = 1.0 / (h * h);
                a += w;
                b += value * w;
                c += value * value * w;
            }
            let discriminant = b * b - a * c;
            if discriminant < 0.0 {
                break;
            }
            t = (b + discriminant.sqrt()) / a;
        }
        Some(t as f32)
    }

    fn known(&self, index: usize) -> f64 {
        if self.status[index] == Status::Known {
            f64::from(self.distance[index])
        } else {
            f64::INFINITY
        }
    }
}

/// Rebuild `output` by fast marching from the iso-contour seeds.
///
/// Returns the number of voxels accepted by the march.
pub(crate) fn fast_marching(
    geometry: &VolumeGeometry,
    input: &[f32],
    iso: &IsoContour,
    params: &DistanceParams,
    output: &mut [f32],
) -> usize {
    let far = params.far_value();
    let limit = params.band + BAND_SLACK;

    let mut marcher = Marcher {
        geometry,
        distance: vec![f32::INFINITY; input.len()],
        status: vec![Status::Far; input.len()],
        heap: BinaryHeap::with_capacity(iso.seeds.len() * 2),
    };
    for &seed in &iso.seeds {
        marcher.distance[seed] = iso.values[seed].abs();
        marcher.status[seed] = Status::Known;
    }
    for &seed in &iso.seeds {
        marcher.push_neighbors(seed);
    }

    let mut accepted = iso.seeds.len();
    while let Some(Trial { index, distance }) = marcher.heap.pop() {
        if marcher.status[index] == Status::Known || distance > marcher.distance[index] {
            continue;
        }
        if distance > limit {
            break;
        }
        marcher.status[index] = Status::Known;
        accepted += 1;
        marcher.push_neighbors(index);
    }

    for (i, out) in output.iter_mut().enumerate() {
        let reference = input[i];
        *out = if reference == 0.0 {
            0.0
        } else {
            let magnitude = if marcher.status[i] == Status::Known {
                marcher.distance[i].min(far)
            } else {
                far
            };
            magnitude.max(MIN_MAGNITUDE).copysign(reference)
        };
    }
    accepted
}
