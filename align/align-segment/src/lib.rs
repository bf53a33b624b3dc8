//! Planar patch extraction for plane-based registration.
//!
//! - [`PlaneSegmenter`] - region growing over a cloud (points with normals
//!   and curvature) or a mesh (edge-adjacent faces), driven as a pausable
//!   state machine
//! - [`PlaneMerger`] - worklist merge of adjacent coplanar patches
//!
//! # Example
//!
//! ```
//! use align_segment::{segment_mesh, MergeParams, PlaneMerger, SegmentParams};
//! use align_types::IndexedMesh;
//! use nalgebra::Point3;
//!
//! // A flat 8x8 grid of quads.
//! let mut mesh = IndexedMesh::new();
//! for j in 0..9 {
//!     for i in 0..9 {
//!         mesh.vertices.push(Point3::new(f64::from(i), f64::from(j), 0.0));
//!     }
//! }
//! for j in 0..8u32 {
//!     for i in 0..8u32 {
//!         let v = j * 9 + i;
//!         mesh.faces.push([v, v + 1, v + 10]);
//!         mesh.faces.push([v, v + 10, v + 9]);
//!     }
//! }
//!
//! let params = SegmentParams::default().with_min_patch_size(10);
//! let segmentation = segment_mesh(&mesh, params).unwrap();
//! assert_eq!(segmentation.patches.len(), 1);
//!
//! let merger = PlaneMerger::new(MergeParams::default()).unwrap();
//! let merged = merger.merge_shared_points(&mesh.vertices, segmentation.patches);
//! assert_eq!(merged.len(), 1);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod domain;
mod error;
mod merge;
mod params;
mod segmenter;

pub use domain::{CloudDomain, FaceAdjacency, GrowthDomain, MeshDomain};
pub use error::{SegmentError, SegmentResult};
pub use merge::PlaneMerger;
pub use params::{MergeParams, SegmentParams};
pub use segmenter::{
    ElementState, PlaneSegmenter, RunOutcome, SegmentationStats, Segmentation,
    SegmenterControl, SegmenterState, segment_cloud, segment_mesh,
};
