//! Batch driver for plane-based alignment.
//!
//! Objects implement [`AlignObject`]: [`CloudObject`] for point clouds,
//! [`MeshObject`] for triangle meshes. Both load through a loader trait
//! ([`CloudLoader`], [`MeshLoader`]), so in-memory data and
//! [`SceneFile`]s (PLY, XYZ) are interchangeable.
//!
//! An [`AlignmentBatch`] holds one target and any number of sources:
//!
//! 1. every object is loaded;
//! 2. the target and all sources are preprocessed and segmented
//!    concurrently;
//! 3. each source is registered against the shared target in parallel.
//!
//! The [`BatchReport`] lists one [`SourceOutcome`] per source. A source
//! that fails to load, segment or match is reported as unaligned and the
//! batch continues.
//!
//! # Example
//!
//! ```
//! use align_pipeline::{
//!     AlignmentBatch, BoxCornerParams, CloudObject, PipelineConfig, box_corner,
//! };
//! use align_types::{RigidTransform, UnitQuaternion, Vector3};
//!
//! let scene = box_corner(
//!     &BoxCornerParams::new().with_points_per_face(1500).with_inlier_ratio(1.0),
//! )
//! .unwrap();
//! let truth = RigidTransform::new(
//!     UnitQuaternion::from_euler_angles(0.1, 0.2, -0.4),
//!     Vector3::new(0.3, 0.1, -0.2),
//! );
//! let mut moved = scene.clone();
//! moved.transform(&truth);
//!
//! let mut batch = AlignmentBatch::new(CloudObject::from_cloud("scene", scene));
//! batch.add_source(CloudObject::from_cloud("moved", moved), Some(truth));
//!
//! let report = batch.run(&PipelineConfig::default()).unwrap();
//! let aligned = report.outcomes[0].report().unwrap();
//! assert!(aligned.rotation_error_deg.unwrap() < 1.0);
//! ```
//!
//! # Errors
//!
//! Only an invalid [`PipelineConfig`], a target that cannot be loaded or
//! segmented, and configuration-class source failures (such as no eligible
//! segmentation seeds) abort [`AlignmentBatch::run`].

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod batch;
mod config;
mod error;
mod loader;
mod metrics;
mod object;
mod palette;
mod ply;
mod sink;
mod synthetic;

pub use batch::{AlignmentBatch, AlignmentReport, BatchReport, SourceOutcome};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use loader::{CloudLoader, MeshLoader, SceneFile, SceneFormat};
pub use metrics::{
    random_rotation, random_transform, random_translation, rotation_error_deg, translation_error,
};
pub use object::{AlignObject, CloudObject, MeshObject};
pub use palette::{
    ALIGNED_COLOR, SOURCE_COLOR, TARGET_COLOR, UNASSIGNED_COLOR, colorize_cloud, colorize_mesh,
    patch_palette,
};
pub use sink::{ExportKind, ExportRecord, ExportSink, PlyDirectory, RecordingSink};
pub use synthetic::{BoxCornerParams, box_corner};
