//! Core volume types for level-set segmentation.
//!
//! This crate provides the grid-level building blocks shared by the
//! distance-transform and level-set crates:
//!
//! - [`VolumeGeometry`] - Dimensions, voxel spacing and linear indexing
//! - [`ScalarVolume`] - A dense `f32` volume laid out x-fastest
//! - [`VoxelFlags`] - Per-voxel narrow-band bookkeeping bits
//!
//! A volume with `tz == 1` is treated as a planar (2D) image throughout the
//! segmentation pipeline.
//!
//! # Example
//!
//! ```
//! use segment_types::{ScalarVolume, VolumeGeometry};
//!
//! let geometry = VolumeGeometry::isotropic([16, 16, 16]).unwrap();
//! let volume = ScalarVolume::from_fn(geometry, |x, _, _| x as f32);
//!
//! assert_eq!(volume.len(), 4096);
//! assert_eq!(volume.get(3, 7, 2), Some(3.0));
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with no engine dependencies. It can be used in:
//! - Segmentation tools and CLIs
//! - Web applications (WASM)
//! - Medical imaging pipelines
//! - Any Rust project that needs voxel grids with physical spacing

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod flags;
mod geometry;
mod volume;

pub use error::{VolumeError, VolumeResult};
pub use flags::VoxelFlags;
pub use geometry::{NeighborOffsets, VolumeGeometry};
pub use volume::ScalarVolume;

// Re-export nalgebra types used in the public API
pub use nalgebra::{Point3, Vector3};
