//! Per-voxel level-set update.
//!
//! Every band voxel is updated from the "current" buffer with
//!
//! ```text
//! next = clamp(u + dt · (curvature - advection - balloon - velocity))
//! ```
//!
//! Band voxels never touch the volume border, so every stencil offset
//! addresses a valid voxel without reflection.

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // f64 locals, f32 storage

use std::f64::consts::SQRT_2;

use nalgebra::Vector3;
use segment_types::{VolumeGeometry, VoxelFlags};

use crate::error::{LevelSetError, LevelSetResult};
use crate::params::{BalloonScheme, CurvatureScheme, EvolutionParams};
use crate::result::IterationStats;

/// Below this squared gradient norm the curvature is not computed.
const MIN_CURVATURE_GRADIENT: f64 = 0.1;

/// Below this norm a velocity vector or gradient is ignored.
const MIN_VELOCITY: f64 = 1e-2;

/// Squared speed scale of the planar velocity damping.
const VELOCITY_DAMPING: f64 = 1e4;

/// Below this norm the cosine weighting is zero.
const MIN_COSINE_NORM: f64 = 1e-10;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Image advection, resolved once per run.
#[derive(Debug, Clone)]
pub(crate) enum Advection {
    Disabled,
    Upwind(Vec<Vector3<f32>>),
    Central(Vec<Vector3<f32>>),
    Morphological(Vec<f32>),
}

/// Precomputed per-voxel inputs of the force terms.
#[derive(Debug, Clone)]
pub(crate) struct ForceTerms {
    pub advection: Advection,
    /// Intensity gradient for cosine weighting.
    pub image_gradient: Option<Vec<Vector3<f32>>>,
    /// Balloon speed per voxel, before `balloon_coeff`.
    pub balloon: Option<Vec<f32>>,
    pub velocity: Option<Vec<Vector3<f32>>>,
    pub curvature_weight: Option<Vec<f32>>,
}

/// Contributions of each term at one voxel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Contributions {
    pub curvature: f64,
    pub advection: f64,
    pub balloon: f64,
    pub velocity: f64,
}

impl Contributions {
    fn speed(&self) -> f64 {
        self.curvature - self.advection - self.balloon - self.velocity
    }
}

/// Running sums over one pass (or one range of it).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct PassTotals {
    pub voxels: usize,
    pub touched: bool,
    sums: Contributions,
}

impl PassTotals {
    fn add(&mut self, c: Contributions) {
        self.voxels += 1;
        self.sums.curvature += c.curvature;
        self.sums.advection += c.advection;
        self.sums.balloon += c.balloon;
        self.sums.velocity += c.velocity;
    }

    pub(crate) fn merge(mut self, other: Self) -> Self {
        self.voxels += other.voxels;
        self.touched |= other.touched;
        self.sums.curvature += other.sums.curvature;
        self.sums.advection += other.sums.advection;
        self.sums.balloon += other.sums.balloon;
        self.sums.velocity += other.sums.velocity;
        self
    }

    pub(crate) fn stats(self) -> IterationStats {
        let n = self.voxels.max(1) as f64;
        IterationStats {
            band_voxels: self.voxels,
            touched: self.touched,
            mean_curvature: (self.sums.curvature / n) as f32,
            mean_advection: (self.sums.advection / n) as f32,
            mean_balloon: (self.sums.balloon / n) as f32,
            mean_velocity: (self.sums.velocity / n) as f32,
        }
    }
}

/// First derivatives of the field at one voxel.
#[derive(Debug, Clone, Copy)]
struct Stencil {
    index: usize,
    u0: f64,
    plus: [isize; 3],
    minus: [isize; 3],
    forward: Vector3<f64>,
    backward: Vector3<f64>,
    central: Vector3<f64>,
}

impl Stencil {
    /// One-sided gradient for a front moving outwards.
    fn expansion(&self) -> Vector3<f64> {
        Vector3::from_fn(|a, _| {
            let (minus, plus) = (self.backward[a], self.forward[a]);
            let mut g = 0.0;
            if minus >= 0.0 {
                g = minus;
            }
            if plus < 0.0 && -plus > g {
                g = plus;
            }
            g
        })
    }

    /// One-sided gradient for a front moving inwards.
    fn contraction(&self) -> Vector3<f64> {
        Vector3::from_fn(|a, _| {
            let (minus, plus) = (self.backward[a], self.forward[a]);
            let mut g = 0.0;
            if minus <= 0.0 {
                g = minus;
            }
            if plus > 0.0 && plus > -g {
                g = plus;
            }
            g
        })
    }
}

/// Linear offsets of the neighbours used by the vessel balloon scheme.
#[derive(Debug, Clone)]
struct Neighborhood {
    axis: Vec<isize>,
    diagonal: Vec<isize>,
    corner: Vec<isize>,
}

impl Neighborhood {
    fn new(geometry: &VolumeGeometry) -> Self {
        let strides = geometry.strides();
        let axes: &[usize] = if geometry.is_planar() { &[0, 1] } else { &[0, 1, 2] };

        let mut axis = Vec::new();
        let mut diagonal = Vec::new();
        let mut corner = Vec::new();
        for (i, &a) in axes.iter().enumerate() {
            axis.extend([-strides[a], strides[a]]);
            for &b in &axes[i + 1..] {
                for sa in [-1, 1] {
                    for sb in [-1, 1] {
                        diagonal.push(sa * strides[a] + sb * strides[b]);
                    }
                }
            }
        }
        if axes.len() == 3 {
            for sx in [-1, 1] {
                for sy in [-1, 1] {
                    for sz in [-1, 1] {
                        corner.push(sx * strides[0] + sy * strides[1] + sz * strides[2]);
                    }
                }
            }
        }
        Self {
            axis,
            diagonal,
            corner,
        }
    }
}

/// Evaluates the update of band voxels against a fixed "current" buffer.
///
/// The evolver only reads shared state; ranges of the band can be processed
/// concurrently.
pub(crate) struct PdeEvolver<'a> {
    geometry: &'a VolumeGeometry,
    params: &'a EvolutionParams,
    terms: &'a ForceTerms,
    current: &'a [f32],
    flags: &'a [VoxelFlags],
    neighborhood: Neighborhood,
}

impl<'a> PdeEvolver<'a> {
    pub(crate) fn new(
        geometry: &'a VolumeGeometry,
        params: &'a EvolutionParams,
        terms: &'a ForceTerms,
        current: &'a [f32],
        flags: &'a [VoxelFlags],
    ) -> Self {
        Self {
            geometry,
            params,
            terms,
            current,
            flags,
            neighborhood: Neighborhood::new(geometry),
        }
    }

    /// Update the voxels of `indices`, writing the new values to the
    /// matching slots of `out`.
    pub(crate) fn evolve_range(&self, indices: &[usize], out: &mut [f32]) -> LevelSetResult<PassTotals> {
        let dt = f64::from(self.params.step_dt);
        let limit = self.params.field_limit();
        let mut totals = PassTotals::default();

        for (slot, &index) in out.iter_mut().zip(indices) {
            let contributions = self.contributions(index);
            let value = f64::from(self.current[index]) + dt * contributions.speed();
            if !value.is_finite() {
                return Err(LevelSetError::NonFiniteUpdate { index });
            }
            let value = (value as f32).clamp(-limit, limit);
            *slot = value;
            totals.add(contributions);
            totals.touched |= self.flags[index].is_touched_by(value);
        }
        Ok(totals)
    }

    pub(crate) fn contributions(&self, index: usize) -> Contributions {
        let stencil = self.stencil(index);
        Contributions {
            curvature: self.curvature(&stencil),
            advection: self.advection(&stencil),
            balloon: self.balloon(&stencil),
            velocity: self.velocity(&stencil),
        }
    }

    fn sample(&self, index: usize, delta: isize) -> f64 {
        f64::from(self.current[self.geometry.offset(index, delta)])
    }

    fn stencil(&self, index: usize) -> Stencil {
        let [x, y, z] = self.geometry.coords(index);
        let offsets = self.geometry.neighbor_offsets(x, y, z);
        let spacing = self.geometry.spacing();
        let u0 = f64::from(self.current[index]);

        let mut forward = Vector3::zeros();
        let mut backward = Vector3::zeros();
        let mut central = Vector3::zeros();
        for a in 0..3 {
            let up = self.sample(index, offsets.plus[a]);
            let um = self.sample(index, offsets.minus[a]);
            forward[a] = (up - u0) / spacing[a];
            backward[a] = (u0 - um) / spacing[a];
            central[a] = (up - um) / (2.0 * spacing[a]);
        }
        Stencil {
            index,
            u0,
            plus: offsets.plus,
            minus: offsets.minus,
            forward,
            backward,
            central,
        }
    }

    fn second(&self, s: &Stencil, a: usize) -> f64 {
        let h = self.geometry.spacing()[a];
        (self.sample(s.index, s.plus[a]) - 2.0 * s.u0 + self.sample(s.index, s.minus[a])) / (h * h)
    }

    fn mixed(&self, s: &Stencil, a: usize, b: usize) -> f64 {
        let spacing = self.geometry.spacing();
        let pp = self.sample(s.index, s.plus[a] + s.plus[b]);
        let mm = self.sample(s.index, s.minus[a] + s.minus[b]);
        let pm = self.sample(s.index, s.plus[a] + s.minus[b]);
        let mp = self.sample(s.index, s.minus[a] + s.plus[b]);
        (pp + mm - pm - mp) * 0.25 / (spacing[a] * spacing[b])
    }

    // ==================== Curvature ====================

    fn curvature(&self, s: &Stencil) -> f64 {
        let coeff = f64::from(self.params.coeff_curvature);
        if coeff <= 0.0 {
            return 0.0;
        }
        let delta0 = s.central.norm_squared();
        if delta0 <= MIN_CURVATURE_GRADIENT {
            return 0.0;
        }

        let [dx, dy, dz] = [s.central.x, s.central.y, s.central.z];
        let (dxx, dyy) = (self.second(s, 0), self.second(s, 1));
        let dxy = self.mixed(s, 0, 1);

        let curvature = if self.geometry.is_planar() {
            (dyy * dx * dx + dxx * dy * dy - 2.0 * dx * dy * dxy) / delta0
        } else {
            let dzz = self.second(s, 2);
            let dxz = self.mixed(s, 0, 2);
            let dyz = self.mixed(s, 1, 2);
            let mean = (0.5
                * ((dyy + dzz) * dx * dx + (dxx + dzz) * dy * dy + (dxx + dyy) * dz * dz)
                - (dx * dy * dxy + dx * dz * dxz + dy * dz * dyz))
                / delta0;
            match self.params.curvature_scheme {
                CurvatureScheme::Mean => mean,
                CurvatureScheme::SmallerPrincipal => {
                    let gauss = (2.0
                        * (dx * dy * (dxz * dyz - dxy * dzz)
                            + dy * dz * (dxz * dxy - dyz * dxx)
                            + dx * dz * (dyz * dxy - dxz * dyy))
                        + dx * dx * (dyy * dzz - dyz * dyz)
                        + dy * dy * (dxx * dzz - dxz * dxz)
                        + dz * dz * (dyy * dxx - dxy * dxy))
                        / delta0;
                    mean - (mean * mean - gauss).max(0.0).sqrt()
                }
            }
        };

        let weight = self
            .terms
            .curvature_weight
            .as_ref()
            .map_or(1.0, |w| f64::from(w[s.index]));
        curvature * coeff * weight
    }

    // ==================== Advection ====================

    fn cosine(&self, s: &Stencil) -> f64 {
        let Some(gradient) = &self.terms.image_gradient else {
            return 1.0;
        };
        let gi = gradient[s.index].cast::<f64>();
        let (nu, ni) = (s.central.norm(), gi.norm());
        if nu < MIN_COSINE_NORM || ni < MIN_COSINE_NORM {
            0.0
        } else {
            -s.central.dot(&gi) / (nu * ni)
        }
    }

    fn advection(&self, s: &Stencil) -> f64 {
        if !self.params.has_advection() {
            return 0.0;
        }
        let coeff = f64::from(self.params.advection_coeff);
        match &self.terms.advection {
            Advection::Disabled => 0.0,
            Advection::Upwind(field) => {
                let v = field[s.index].cast::<f64>();
                let cosine = self.cosine(s);
                let reverse = cosine < 0.0;
                let mut sum = 0.0;
                for a in 0..3 {
                    let backward = (v[a] > 0.0) != reverse;
                    sum += v[a] * if backward { s.backward[a] } else { s.forward[a] };
                }
                sum * coeff * cosine
            }
            Advection::Central(field) => {
                let v = field[s.index].cast::<f64>();
                s.central.dot(&v) * coeff * self.cosine(s)
            }
            Advection::Morphological(second) => {
                let weighted = f64::from(second[s.index]) * coeff;
                let gradient = if weighted < 0.0 {
                    s.expansion()
                } else {
                    s.contraction()
                };
                -gradient.norm() * weighted
            }
        }
    }

    // ==================== Balloon ====================

    fn balloon(&self, s: &Stencil) -> f64 {
        let Some(speeds) = &self.terms.balloon else {
            return 0.0;
        };
        let base = f64::from(self.params.balloon_coeff) * f64::from(speeds[s.index]);
        let expanding = base > 0.0;
        let gradient = match self.params.balloon_scheme {
            BalloonScheme::Directional => {
                if expanding {
                    s.expansion().norm()
                } else {
                    s.contraction().norm()
                }
            }
            BalloonScheme::Vessel => self.vessel_gradient(s, expanding),
        };
        base * gradient
    }

    /// Largest drop (or rise) towards axis, diagonal and corner neighbours,
    /// normalized by neighbour distance.
    fn vessel_gradient(&self, s: &Stencil, expanding: bool) -> f64 {
        let extreme = |offsets: &[isize]| {
            let values = offsets.iter().map(|&d| self.sample(s.index, d));
            if expanding {
                values.fold(f64::INFINITY, f64::min)
            } else {
                values.fold(f64::NEG_INFINITY, f64::max)
            }
        };
        let groups = [
            (&self.neighborhood.axis, 1.0),
            (&self.neighborhood.diagonal, SQRT_2),
            (&self.neighborhood.corner, SQRT_3),
        ];
        groups
            .into_iter()
            .filter(|(offsets, _)| !offsets.is_empty())
            .map(|(offsets, distance)| {
                let e = extreme(offsets.as_slice());
                let drop = if expanding { s.u0 - e } else { e - s.u0 };
                drop / distance
            })
            .fold(0.0, f64::max)
    }

    // ==================== Velocity ====================

    fn velocity(&self, s: &Stencil) -> f64 {
        let Some(field) = &self.terms.velocity else {
            return 0.0;
        };
        let coeff = f64::from(self.params.coeff_velocity);
        let v = field[s.index].cast::<f64>();
        let nv = v.norm();
        if nv <= MIN_VELOCITY {
            return 0.0;
        }

        if self.geometry.is_planar() {
            let g = s.expansion();
            let ng = g.norm();
            if ng <= MIN_VELOCITY {
                return 0.0;
            }
            let damping = 1.0 - (-(nv * nv) / VELOCITY_DAMPING).exp();
            ng * v.dot(&g).abs() / (ng * nv) * damping * coeff
        } else {
            let mut sum = 0.0;
            for a in 0..3 {
                sum += v[a] * if v[a] > 0.0 { s.backward[a] } else { s.forward[a] };
            }
            sum.max(0.0) * coeff
        }
    }
}
