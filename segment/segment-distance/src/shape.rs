//! Vector propagation with skeleton extraction.
//!
//! Each voxel carries the vector from its nearest crossing point, propagated
//! in increasing distance order over the full 8 (2D) or 26 (3D)
//! neighbourhood. Two accepted inside neighbours whose vectors point in
//! opposite directions sit on either side of the medial axis; the deeper of
//! the two is marked as skeleton.

use std::collections::BinaryHeap;

use nalgebra::Vector3;
use segment_types::VolumeGeometry;

use crate::fast_marching::Trial;
use crate::iso_contour::IsoContour;
use crate::params::{DistanceParams, MIN_MAGNITUDE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Far,
    Trial,
    Known,
}

/// Neighbour steps in voxel units.
fn neighborhood(planar: bool) -> Vec<[isize; 3]> {
    let z_range: &[isize] = if planar { &[0] } else { &[-1, 0, 1] };
    let mut steps = Vec::with_capacity(26);
    for &dz in z_range {
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                if dx != 0 || dy != 0 || dz != 0 {
                    steps.push([dx, dy, dz]);
                }
            }
        }
    }
    steps
}

/// Rebuild `output` by vector propagation and fill `skeleton`.
///
/// `seed_offsets` holds the crossing vectors of the iso-contour seeds.
/// Returns the number of skeleton voxels.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn shape_propagation(
    geometry: &VolumeGeometry,
    input: &[f32],
    iso: &IsoContour,
    seed_offsets: &[Vector3<f32>],
    params: &DistanceParams,
    output: &mut [f32],
    skeleton: &mut Vec<bool>,
) -> usize {
    let far = params.far_value();
    let inside_limit = -params.inside_limit();
    let dims = geometry.dims();
    let spacing = geometry.spacing().cast::<f32>();
    let steps = neighborhood(geometry.is_planar());

    let n = input.len();
    let mut distance = vec![f32::INFINITY; n];
    let mut vectors = vec![Vector3::<f32>::zeros(); n];
    let mut status = vec![Status::Far; n];
    skeleton.clear();
    skeleton.resize(n, false);

    let mut heap = BinaryHeap::with_capacity(iso.seeds.len() * 2);
    for &seed in &iso.seeds {
        distance[seed] = iso.values[seed].abs();
        vectors[seed] = seed_offsets[seed];
        status[seed] = Status::Trial;
        heap.push(Trial {
            index: seed,
            distance: distance[seed],
        });
    }

    let mut marked = 0;
    while let Some(Trial { index: p, distance: d }) = heap.pop() {
        if status[p] == Status::Known || d > distance[p] {
            continue;
        }
        status[p] = Status::Known;

        let inside = input[p] < 0.0;
        let limit = if inside { inside_limit } else { far };
        let expand = d <= limit && input[p] != 0.0;

        let coords = geometry.coords(p);
        for step in &steps {
            let mut neighbor = [0usize; 3];
            let mut valid = true;
            for axis in 0..3 {
                match coords[axis].checked_add_signed(step[axis]) {
                    Some(c) if c < dims[axis] => neighbor[axis] = c,
                    _ => valid = false,
                }
            }
            if !valid {
                continue;
            }
            let q = geometry.index(neighbor[0], neighbor[1], neighbor[2]);
            if input[q] == 0.0 {
                continue;
            }

            if status[q] == Status::Known {
                let both_inside = inside && input[q] < 0.0;
                if both_inside
                    && !skeleton[p]
                    && !skeleton[q]
                    && vectors[p].dot(&vectors[q]) < 0.0
                {
                    let deeper = if distance[p] >= distance[q] { p } else { q };
                    skeleton[deeper] = true;
                    marked += 1;
                }
                continue;
            }
            if !expand || (input[q] < 0.0) != inside {
                continue;
            }

            let delta = Vector3::new(
                step[0] as f32 * spacing.x,
                step[1] as f32 * spacing.y,
                step[2] as f32 * spacing.z,
            );
            let candidate = vectors[p] + delta;
            let magnitude = candidate.norm();
            if magnitude < distance[q] {
                distance[q] = magnitude;
                vectors[q] = candidate;
                status[q] = Status::Trial;
                heap.push(Trial {
                    index: q,
                    distance: magnitude,
                });
            }
        }
    }

    for (i, out) in output.iter_mut().enumerate() {
        let reference = input[i];
        *out = if reference == 0.0 {
            0.0
        } else {
            let magnitude = if status[i] == Status::Known {
                distance[i].clamp(MIN_MAGNITUDE, far)
            } else {
                far
            };
            magnitude.copysign(reference)
        };
    }
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso_contour::seed;
    use approx::assert_relative_eq;

    fn run(geometry: &VolumeGeometry, input: &[f32]) -> (Vec<f32>, Vec<bool>) {
        let params = DistanceParams::default();
        let iso = seed(geometry, input, &params, true);
        let offsets = iso.offsets.clone().unwrap();
        let mut output = vec![0.0; input.len()];
        let mut skeleton = Vec::new();
        shape_propagation(
            geometry,
            input,
            &iso,
            &offsets,
            &params,
            &mut output,
            &mut skeleton,
        );
        (output, skeleton)
    }

    #[test]
    fn test_neighborhood_sizes() {
        assert_eq!(neighborhood(false).len(), 26);
        assert_eq!(neighborhood(true).len(), 8);
    }

    #[test]
    fn test_slab_skeleton_on_midline() {
        // Horizontal slab |y - 10| < 4.5 in a planar image
        let geometry = VolumeGeometry::isotropic([24, 21, 1]).unwrap();
        let input: Vec<f32> = (0..geometry.len())
            .map(|i| (geometry.coords(i)[1] as f32 - 10.0).abs() - 4.5)
            .collect();
        let (output, skeleton) = run(&geometry, &input);

        let mid = geometry.index(12, 10, 0);
        assert!(skeleton[mid], "midline voxel should be skeleton");
        let edge = geometry.index(12, 7, 0);
        assert!(!skeleton[edge]);
        let outside = geometry.index(12, 18, 0);
        assert!(!skeleton[outside]);

        assert_relative_eq!(output[geometry.index(12, 12, 0)], -2.5, epsilon = 1e-4);
        assert_relative_eq!(output[geometry.index(12, 17, 0)], 2.5, epsilon = 1e-4);
    }
}
