//! Plane model for plane-based registration.
//!
//! - [`Plane`] - implicit plane `a*x + b*y + c*z + d = 0` with centroid,
//!   fitted by SVD of the centered scatter matrix
//! - [`SegmentedPlane`] - a plane plus its supporting point indices,
//!   residual standard deviation and bounding box
//!
//! Distance and normal queries always normalize `(a, b, c)`, so planes
//! with rescaled coefficients answer identically.
//!
//! Residual statistics are computed as parallel reductions with rayon.
//!
//! # Example
//!
//! ```
//! use align_plane::SegmentedPlane;
//! use nalgebra::Point3;
//!
//! let points: Vec<_> = (0..50)
//!     .map(|i| {
//!         let t = f64::from(i);
//!         Point3::new(t.sin(), (t * 0.7).cos(), 2.0)
//!     })
//!     .collect();
//! let indices: Vec<usize> = (0..points.len()).collect();
//!
//! let patch = SegmentedPlane::from_indices(&points, indices).unwrap();
//! assert!(patch.std_dev < 1e-9);
//! assert!((patch.plane.distance_to(&Point3::new(0.0, 0.0, 5.0)) - 3.0).abs() < 1e-9);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod plane;
mod segmented;

pub use error::{PlaneError, PlaneResult};
pub use plane::{Plane, SINGULAR_GAP_TOLERANCE};
pub use segmented::SegmentedPlane;
