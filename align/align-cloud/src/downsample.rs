//! Voxel-grid resampling.

use std::collections::BTreeMap;

use align_types::{CloudPoint, PointCloud};
use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::{CloudError, CloudResult};

/// Downsamples a point cloud on a voxel grid of edge length `leaf`.
///
/// Each occupied voxel is replaced by the centroid of its points, which
/// keeps the color of the first point that fell into it. Normals and
/// curvature are dropped since they no longer describe the new points.
/// Output order follows voxel coordinates, so it is reproducible.
///
/// # Errors
///
/// Returns [`CloudError::InvalidParameter`] if `leaf` is not a positive
/// finite number.
///
/// # Example
///
/// ```
/// use align_cloud::voxel_downsample;
/// use align_types::PointCloud;
/// use nalgebra::Point3;
///
/// let positions: Vec<_> = (0..100)
///     .map(|i| Point3::new(f64::from(i) * 0.01, 0.0, 0.0))
///     .collect();
/// let cloud = PointCloud::from_positions(&positions);
///
/// let coarse = voxel_downsample(&cloud, 0.1).unwrap();
/// assert_eq!(coarse.len(), 10);
/// ```
pub fn voxel_downsample(cloud: &PointCloud, leaf: f64) -> CloudResult<PointCloud> {
    if !(leaf.is_finite() && leaf > 0.0) {
        return Err(CloudError::InvalidParameter {
            reason: format!("voxel leaf size must be positive, got {leaf}"),
        });
    }

    let mut voxels: BTreeMap<(i64, i64, i64), (Vector3<f64>, usize, Option<_>)> =
        BTreeMap::new();

    for point in &cloud.points {
        #[allow(clippy::cast_possible_truncation)]
        // Voxel coordinates of real scans stay far inside i64
        let key = (
            (point.position.x / leaf).floor() as i64,
            (point.position.y / leaf).floor() as i64,
            (point.position.z / leaf).floor() as i64,
        );
        let entry = voxels
            .entry(key)
            .or_insert((Vector3::zeros(), 0, point.color));
        entry.0 += point.position.coords;
        entry.1 += 1;
    }

    let points: Vec<CloudPoint> = voxels
        .into_values()
        .map(|(sum, count, color)| {
            #[allow(clippy::cast_precision_loss)]
            let centroid = sum / count as f64;
            let mut point = CloudPoint::new(Point3::from(centroid));
            point.color = color;
            point
        })
        .collect();

    debug!(before = cloud.len(), after = points.len(), leaf, "voxel downsample");
    Ok(PointCloud { points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_types::VertexColor;
    use approx::assert_relative_eq;

    #[test]
    fn voxel_centroids() {
        let mut cloud = PointCloud::from_positions(&[
            Point3::new(0.1, 0.1, 0.1),
            Point3::new(0.3, 0.3, 0.3),
            Point3::new(1.5, 0.5, 0.5),
        ]);
        cloud.points[0].color = Some(VertexColor::RED);
        cloud.points[0].normal = Some(Vector3::z());

        let down = voxel_downsample(&cloud, 1.0).unwrap();
        assert_eq!(down.len(), 2);
        assert_relative_eq!(down.points[0].position.x, 0.2, epsilon = 1e-12);
        assert_eq!(down.points[0].color, Some(VertexColor::RED));
        assert!(down.points[0].normal.is_none());
        assert_relative_eq!(down.points[1].position.x, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn rejects_non_positive_leaf() {
        let cloud = PointCloud::from_positions(&[Point3::origin()]);
        assert!(voxel_downsample(&cloud, 0.0).is_err());
        assert!(voxel_downsample(&cloud, f64::NAN).is_err());
    }

    #[test]
    fn empty_cloud_stays_empty() {
        let down = voxel_downsample(&PointCloud::new(), 0.5).unwrap();
        assert!(down.is_empty());
    }
}
