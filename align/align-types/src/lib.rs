//! Core geometric types for plane-based registration.
//!
//! This crate provides the foundational types shared by every stage of the
//! alignment pipeline:
//!
//! - [`CloudPoint`] / [`PointCloud`] - Scan points with optional normal,
//!   curvature and color
//! - [`IndexedMesh`] - Triangulated mesh with indexed vertices
//! - [`RigidTransform`] - Rotation + translation, composable across stages
//! - [`Aabb`] - Axis-aligned bounding box used for extents
//! - [`VertexColor`] - 8-bit RGB color for visualization sinks
//!
//! # No I/O
//!
//! Loading and saving of scan formats is the job of the caller.
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64`.
//!
//! # Example
//!
//! ```
//! use align_types::{PointCloud, RigidTransform, Point3, Vector3};
//!
//! let mut cloud = PointCloud::from_positions(&[
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ]);
//!
//! let shift = RigidTransform::from_translation(Vector3::new(0.0, 0.0, 2.0));
//! cloud.transform(&shift);
//!
//! assert!((cloud.points[0].position.z - 2.0).abs() < 1e-12);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod bounds;
mod color;
mod mesh;
mod point;
mod transform;

pub use bounds::Aabb;
pub use color::VertexColor;
pub use mesh::IndexedMesh;
pub use point::{CloudPoint, PointCloud};
pub use transform::RigidTransform;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
