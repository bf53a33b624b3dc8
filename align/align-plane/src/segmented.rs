//! Planar patches produced by segmentation.

use align_types::Aabb;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::PlaneResult;
use crate::plane::Plane;

/// A fitted plane together with the points that support it.
///
/// `indices` is sorted ascending and free of duplicates; the indices refer
/// to the point slice (or mesh vertex array) the patch was segmented from.
///
/// # Example
///
/// ```
/// use align_plane::SegmentedPlane;
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(2.0, 0.0, 0.0),
///     Point3::new(0.0, 2.0, 0.0),
///     Point3::new(2.0, 2.0, 0.0),
/// ];
/// let patch = SegmentedPlane::from_indices(&points, vec![3, 1, 0, 2, 1]).unwrap();
///
/// assert_eq!(patch.indices, vec![0, 1, 2, 3]);
/// assert!(patch.std_dev < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentedPlane {
    /// The least-squares plane over `indices`.
    pub plane: Plane,
    /// Supporting point indices, sorted and unique.
    pub indices: Vec<usize>,
    /// Residual standard deviation of the supporting points.
    pub std_dev: f64,
    /// Bounding box of the supporting points.
    pub bounds: Aabb,
}

impl SegmentedPlane {
    /// Fits a patch to the given point indices.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Plane::fit`].
    pub fn from_indices(points: &[Point3<f64>], mut indices: Vec<usize>) -> PlaneResult<Self> {
        indices.sort_unstable();
        indices.dedup();
        let plane = Plane::fit(points, &indices)?;
        let std_dev = plane.residual_std_dev(points, &indices);
        let bounds = Aabb::from_points(indices.iter().map(|&i| &points[i]));
        Ok(Self {
            plane,
            indices,
            std_dev,
            bounds,
        })
    }

    /// Union of two patches, re-fitted over the combined point set.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Plane::fit`].
    pub fn merged(&self, other: &Self, points: &[Point3<f64>]) -> PlaneResult<Self> {
        let mut indices = Vec::with_capacity(self.indices.len() + other.indices.len());
        indices.extend_from_slice(&self.indices);
        indices.extend_from_slice(&other.indices);
        Self::from_indices(points, indices)
    }

    /// Number of supporting points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if the patch has no supporting points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Centroid of the supporting points.
    #[must_use]
    pub const fn centroid(&self) -> Point3<f64> {
        self.plane.centroid()
    }

    /// Unit normal of the fitted plane.
    #[must_use]
    pub fn normal(&self) -> Vector3<f64> {
        self.plane.normal()
    }

    /// Diagonal of the bounding box, a size measure independent of density.
    #[must_use]
    pub fn extent(&self) -> f64 {
        self.bounds.diagonal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaneError;
    use approx::assert_relative_eq;

    fn square(z: f64, offset: f64) -> Vec<Point3<f64>> {
        vec![
            Point3::new(offset, 0.0, z),
            Point3::new(offset + 1.0, 0.0, z),
            Point3::new(offset, 1.0, z),
            Point3::new(offset + 1.0, 1.0, z),
        ]
    }

    #[test]
    fn merged_patch_refits_union() {
        let mut points = square(0.0, 0.0);
        points.extend(square(0.0, 3.0));
        let a = SegmentedPlane::from_indices(&points, vec![0, 1, 2, 3]).unwrap();
        let b = SegmentedPlane::from_indices(&points, vec![4, 5, 6, 7]).unwrap();

        let m = a.merged(&b, &points).unwrap();
        assert_eq!(m.len(), 8);
        assert_relative_eq!(m.centroid().x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(m.normal().z.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(m.extent(), 17.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn merging_tilted_patches_raises_std_dev() {
        let mut points = square(0.0, 0.0);
        points.extend([
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.6),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 1.0, 0.6),
            Point3::new(1.5, 0.5, 0.3),
        ]);
        let a = SegmentedPlane::from_indices(&points, vec![0, 1, 2, 3]).unwrap();
        let b = SegmentedPlane::from_indices(&points, vec![4, 5, 6, 7, 8]).unwrap();
        assert!(a.std_dev < 1e-12 && b.std_dev < 1e-12);

        let m = a.merged(&b, &points).unwrap();
        assert!(m.std_dev > 1e-3);
    }

    #[test]
    fn out_of_range_index_is_reported() {
        let points = square(0.0, 0.0);
        assert!(matches!(
            SegmentedPlane::from_indices(&points, vec![0, 1, 2, 7]),
            Err(PlaneError::IndexOutOfBounds { index: 7, len: 4 })
        ));
    }

    #[test]
    fn too_few_points_is_degenerate() {
        let points = square(0.0, 0.0);
        assert!(matches!(
            SegmentedPlane::from_indices(&points, vec![0, 1, 1]),
            Err(PlaneError::DegeneratePlaneFit { points: 2, .. })
        ));
    }
}
