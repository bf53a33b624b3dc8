//! Plane correspondence search and staged rigid registration.
//!
//! This crate turns two sets of planar patches into a rigid transform:
//! - **Correspondence search** - [`PlaneMatcher`] pairs patches using
//!   rigid-invariant quantities (inter-plane angles, centroid distances)
//! - **Plane solve** - [`compute_plane_transform`] recovers rotation from
//!   matched normals and translation from point-to-plane residuals
//! - **Kabsch algorithm** - Optimal rigid transform from paired points
//! - **ICP (Iterative Closest Point)** - Point-level polish
//!
//! [`register_planes`] chains them: coarse solve, refinement over all
//! proximity-matched patches, then ICP, composing the three transforms.
//!
//! # Direct Point-to-Point Alignment
//!
//! ```
//! use align_registration::compute_rigid_transform;
//! use nalgebra::{Point3, Vector3};
//!
//! let source = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! let target: Vec<_> = source.iter().map(|p| p + Vector3::new(5.0, 0.0, 0.0)).collect();
//!
//! let transform = compute_rigid_transform(&source, &target).unwrap();
//! assert!((transform.translation.x - 5.0).abs() < 1e-10);
//! ```
//!
//! # Confidence
//!
//! Failing to find three consistent plane pairs is an error
//! ([`RegistrationError::InsufficientCorrespondences`]). Later stages never
//! fail the registration: they fall back to the previous transform and
//! report [`Confidence::Reduced`].

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod icp;
mod kabsch;
mod matcher;
mod params;
mod register;

pub use error::{RegistrationError, RegistrationResult};
pub use icp::{IcpParams, IcpResult, icp_align_indexed, icp_align_points};
pub use kabsch::{
    PlaneObservation, compute_plane_transform, compute_rigid_transform,
    compute_weighted_rigid_transform,
};
pub use matcher::{Matching, PlaneMatch, PlaneMatcher};
pub use params::{MIN_PLANE_PAIRS, MatchParams, RefineParams, RegistrationParams};
pub use register::{
    Confidence, MatchedPair, PlaneRegistration, PlaneScene, register_planes,
    register_planes_indexed,
};
