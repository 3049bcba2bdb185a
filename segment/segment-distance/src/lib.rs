//! Signed distance reinitialization for narrow-band level sets.
//!
//! Level-set evolution slowly destroys the `|∇u| ≈ 1` property of its
//! field. This crate rebuilds a signed distance field from the current zero
//! crossing, saturated at `band + 1`, using one of four strategies:
//!
//! - [`DistanceStrategy::FrontPropagation`] - Upwind pseudo-time evolution
//!   inside a tube around the front
//! - [`DistanceStrategy::FastMarching`] - Monotone Eikonal solve from
//!   sub-voxel crossing estimates (default)
//! - [`DistanceStrategy::Chamfer`] - Two raster passes with fixed weights
//! - [`DistanceStrategy::Shape`] - Vector propagation that also extracts the
//!   inside skeleton
//!
//! Every strategy keeps the sign of each non-zero input voxel. A field that
//! never crosses zero is replaced by a uniform `±(band + 1)` and reported as
//! an empty crossing.
//!
//! # Example
//!
//! ```
//! use segment_distance::{DistanceMapEngine, DistanceParams, DistanceStrategy};
//! use segment_types::VolumeGeometry;
//!
//! let geometry = VolumeGeometry::isotropic([20, 20, 20]).unwrap();
//! let input: Vec<f32> = (0..geometry.len())
//!     .map(|i| {
//!         let [x, y, z] = geometry.coords(i);
//!         let d = [x, y, z].map(|c| c as f32 - 10.0);
//!         (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt() - 5.0
//!     })
//!     .collect();
//!
//! let mut engine =
//!     DistanceMapEngine::new(geometry, DistanceStrategy::FastMarching, DistanceParams::default())
//!         .unwrap();
//! let mut output = vec![0.0; input.len()];
//! engine.reinitialize(&input, &mut output, None).unwrap();
//!
//! // Center is deep inside: saturated at -(band + 1)
//! assert_eq!(output[geometry.index(10, 10, 10)], -5.0);
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with no engine dependencies. It can be used in:
//! - Level-set and active-contour solvers
//! - Medical imaging pipelines
//! - Skeletonization of binary masks

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod chamfer;
mod engine;
mod error;
mod fast_marching;
mod front;
mod iso_contour;
mod params;
mod shape;

pub use engine::{DistanceMapEngine, DistanceReport};
pub use error::{DistanceError, DistanceResult};
pub use front::{TubeVoxel, tube_from_field};
pub use params::{DistanceParams, DistanceStrategy};
