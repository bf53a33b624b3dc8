//! Plane-based registration of point clouds and meshes.
//!
//! This umbrella crate re-exports all align-* crates. Scans are segmented
//! into planar patches, patches are paired between a source and a target
//! using rigid-invariant geometry, and the resulting transform is refined
//! at the plane level and then by point ICP.
//!
//! # Quick Start
//!
//! ```no_run
//! use align::prelude::*;
//!
//! let mut batch = AlignmentBatch::new(CloudObject::from_file(SceneFile::new("target.ply")));
//! batch.add_source(CloudObject::from_file(SceneFile::new("scan_01.ply")), None);
//! batch.add_source(CloudObject::from_file(SceneFile::new("scan_02.xyz")), None);
//!
//! let report = batch.run(&PipelineConfig::default()).unwrap();
//! print!("{report}");
//! report.export_aligned(&mut PlyDirectory::new("out")).unwrap();
//! ```
//!
//! # Module Organization
//!
//! - [`types`] - Points, clouds, meshes, colors, bounding boxes, rigid transforms
//! - [`cloud`] - Neighbor queries, normal and curvature estimation, voxel resampling
//! - [`plane`] - Plane fitting, distances and residual statistics
//! - [`segment`] - Region-growing segmentation and coplanar patch merging
//! - [`registration`] - Plane matching, staged rigid registration and ICP
//! - [`pipeline`] - Loaders, objects, batch driver, metrics and export

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

// =============================================================================
// Re-exports
// =============================================================================

/// Points, clouds, meshes, colors, bounding boxes, rigid transforms.
pub use align_types as types;

/// Neighbor queries, normal and curvature estimation, voxel resampling.
pub use align_cloud as cloud;

/// Plane fitting, distances and residual statistics.
pub use align_plane as plane;

/// Region-growing segmentation and coplanar patch merging.
pub use align_segment as segment;

/// Plane matching, staged rigid registration and ICP.
pub use align_registration as registration;

/// Loaders, objects, batch driver, metrics and export.
pub use align_pipeline as pipeline;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for plane-based alignment.
///
/// ```
/// use align::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use align_types::{CloudPoint, IndexedMesh, Point3, PointCloud, RigidTransform, Vector3};

    // Cloud preparation
    pub use align_cloud::{KdNeighbors, NeighborQuery, NormalParams, estimate_normals};

    // Planes and segmentation
    pub use align_plane::{Plane, SegmentedPlane};
    pub use align_segment::{
        MergeParams, PlaneMerger, PlaneSegmenter, SegmentParams, segment_cloud, segment_mesh,
    };

    // Registration
    pub use align_registration::{
        Confidence, PlaneScene, RegistrationParams, register_planes,
    };

    // Batch pipeline
    pub use align_pipeline::{
        AlignObject, AlignmentBatch, CloudObject, MeshObject, PipelineConfig, PlyDirectory,
        SceneFile,
    };
}

// =============================================================================
// Tests
// =============================================================================
