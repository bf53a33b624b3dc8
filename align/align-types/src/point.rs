//! Scan points and point clouds.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Aabb, RigidTransform, VertexColor};

/// A point in a point cloud with optional attributes.
///
/// Normals and curvature are filled in by a normal estimator; raw scan
/// points usually carry neither.
///
/// # Example
///
/// ```
/// use align_types::{CloudPoint, Point3, Vector3};
///
/// let p1 = CloudPoint::new(Point3::new(1.0, 2.0, 3.0));
/// let p2 = CloudPoint::with_normal(Point3::new(1.0, 2.0, 3.0), Vector3::z());
///
/// assert!(p1.normal.is_none());
/// assert!(p2.has_normal());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CloudPoint {
    /// The 3D position of the point.
    pub position: Point3<f64>,

    /// Optional unit normal vector at this point.
    pub normal: Option<Vector3<f64>>,

    /// Optional surface variation, `lambda_min / (l0 + l1 + l2)`, in `[0, 1/3]`.
    pub curvature: Option<f64>,

    /// Optional RGB color.
    pub color: Option<VertexColor>,
}

impl CloudPoint {
    /// Creates a new point with just a position.
    #[must_use]
    pub const fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            curvature: None,
            color: None,
        }
    }

    /// Creates a point from x, y, z coordinates.
    #[must_use]
    pub const fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Creates a point with position and normal.
    #[must_use]
    pub const fn with_normal(position: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            position,
            normal: Some(normal),
            curvature: None,
            color: None,
        }
    }

    /// Returns true if this point has a normal.
    #[must_use]
    pub const fn has_normal(&self) -> bool {
        self.normal.is_some()
    }
}

impl Default for CloudPoint {
    fn default() -> Self {
        Self::new(Point3::origin())
    }
}

/// A collection of 3D points with optional attributes.
///
/// # Example
///
/// ```
/// use align_types::PointCloud;
///
/// let mut cloud = PointCloud::new();
/// cloud.push_coords(0.0, 0.0, 0.0);
/// cloud.push_coords(1.0, 0.0, 0.0);
///
/// assert_eq!(cloud.len(), 2);
/// assert!(!cloud.has_normals());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointCloud {
    /// The points in this cloud.
    pub points: Vec<CloudPoint>,
}

impl PointCloud {
    /// Creates an empty point cloud.
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Creates a point cloud with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Creates a point cloud from a slice of 3D positions.
    #[must_use]
    pub fn from_positions(positions: &[Point3<f64>]) -> Self {
        let points = positions.iter().map(|p| CloudPoint::new(*p)).collect();
        Self { points }
    }

    /// Returns the number of points in the cloud.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the cloud has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns true if all points have normals.
    #[must_use]
    pub fn has_normals(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(CloudPoint::has_normal)
    }

    /// Adds a point to the cloud.
    pub fn push(&mut self, point: CloudPoint) {
        self.points.push(point);
    }

    /// Adds a point with the given coordinates.
    pub fn push_coords(&mut self, x: f64, y: f64, z: f64) {
        self.points.push(CloudPoint::from_coords(x, y, z));
    }

    /// Copies out the point positions.
    ///
    /// Patch indices produced by the segmenters refer into this vector.
    #[must_use]
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Returns the axis-aligned bounding box of the point cloud.
    ///
    /// Returns `None` if the cloud is empty.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        if self.points.is_empty() {
            return None;
        }
        Some(Aabb::from_points(self.points.iter().map(|p| &p.position)))
    }

    /// Returns the mean position, or `None` if the cloud is empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    // Precision loss is acceptable: point counts are far below 2^52
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let sum: Vector3<f64> = self.points.iter().map(|p| p.position.coords).sum();
        Some(Point3::from(sum / self.points.len() as f64))
    }

    /// Applies a rigid transform in place. Normals are rotated with the points.
    pub fn transform(&mut self, transform: &RigidTransform) {
        for point in &mut self.points {
            point.position = transform.transform_point(&point.position);
            if let Some(normal) = point.normal.as_mut() {
                *normal = transform.transform_vector(normal);
            }
        }
    }

    /// Clears every point color.
    pub fn clear_colors(&mut self) {
        for point in &mut self.points {
            point.color = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use std::f64::consts::PI;

    #[test]
    fn empty_cloud_has_no_bounds_or_centroid() {
        let cloud = PointCloud::new();
        assert!(cloud.bounds().is_none());
        assert!(cloud.centroid().is_none());
        assert!(!cloud.has_normals());
    }

    #[test]
    fn centroid_and_bounds() {
        let cloud = PointCloud::from_positions(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 2.0),
            Point3::new(2.0, 4.0, 2.0),
        ]);
        let centroid = cloud.centroid().unwrap();
        assert_relative_eq!(centroid.coords, Vector3::new(1.0, 2.0, 1.0));

        let bounds = cloud.bounds().unwrap();
        assert_relative_eq!(bounds.max.y, 4.0);
        assert_eq!(cloud.positions().len(), 4);
    }

    #[test]
    fn transform_rotates_normals_without_translating_them() {
        let mut cloud = PointCloud::new();
        cloud.push(CloudPoint::with_normal(Point3::new(1.0, 0.0, 0.0), Vector3::x()));
        cloud.push_coords(0.0, 1.0, 0.0);

        let transform = RigidTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.0),
            Vector3::new(0.0, 0.0, 5.0),
        );
        cloud.transform(&transform);

        let first = &cloud.points[0];
        assert_relative_eq!(first.position.coords, Vector3::new(0.0, 1.0, 5.0), epsilon = 1e-12);
        assert_relative_eq!(first.normal.unwrap(), Vector3::y(), epsilon = 1e-12);
        assert!(cloud.points[1].normal.is_none());
    }
}
