//! Point cloud preparation for plane segmentation.
//!
//! This crate provides:
//!
//! - [`NeighborQuery`] - the neighbor lookup capability used by segmentation,
//!   merging and ICP, with the KD-tree implementation [`KdNeighbors`]
//! - [`estimate_normals`] - per-point unit normal and curvature by local PCA
//! - [`voxel_downsample`] - voxel-grid resampling before segmentation
//!
//! # Example
//!
//! ```
//! use align_cloud::{estimate_normals, KdNeighbors, NeighborQuery, NormalParams};
//! use align_types::PointCloud;
//! use nalgebra::Point3;
//!
//! let positions: Vec<_> = (0..200)
//!     .map(|i| {
//!         let t = f64::from(i);
//!         Point3::new((t * 0.37).sin(), (t * 0.71).cos(), 0.001 * (t * 1.3).sin())
//!     })
//!     .collect();
//! let index = KdNeighbors::new(&positions);
//! let mut cloud = PointCloud::from_positions(&positions);
//!
//! estimate_normals(&mut cloud, &index, &NormalParams::default()).unwrap();
//! assert!(cloud.points.iter().all(|p| p.curvature.is_some()));
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod downsample;
mod error;
mod neighbors;
mod normals;

pub use downsample::voxel_downsample;
pub use error::{CloudError, CloudResult};
pub use neighbors::{KdNeighbors, NeighborQuery, Neighborhood};
pub use normals::{
    FALLBACK_CURVATURE, LocalSurface, NormalParams, estimate_normals, fit_local_surface,
};
