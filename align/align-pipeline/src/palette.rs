//! Display colors for objects and segmented patches.

use align_plane::SegmentedPlane;
use align_types::{IndexedMesh, PointCloud, VertexColor};

/// Color of the target object in exports.
pub const TARGET_COLOR: VertexColor = VertexColor::new(230, 230, 230);

/// Color of a source object before alignment.
pub const SOURCE_COLOR: VertexColor = VertexColor::new(220, 60, 60);

/// Color of a source object after alignment.
pub const ALIGNED_COLOR: VertexColor = VertexColor::new(60, 200, 90);

/// Color of points that belong to no patch.
pub const UNASSIGNED_COLOR: VertexColor = VertexColor::new(96, 96, 96);

/// `n` visually distinct colors.
///
/// Hues step by the golden ratio, so neighboring patch indices never get
/// similar colors and the palette for `n` is a prefix of the one for `n + 1`.
///
/// # Example
///
/// ```
/// use align_pipeline::patch_palette;
///
/// let colors = patch_palette(5);
/// assert_eq!(colors.len(), 5);
/// assert_eq!(colors[..3], patch_palette(3)[..]);
/// ```
#[must_use]
pub fn patch_palette(n: usize) -> Vec<VertexColor> {
    const GOLDEN_RATIO_CONJUGATE: f64 = 0.618_033_988_749_895;
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let hue = (i as f64 * GOLDEN_RATIO_CONJUGATE).fract();
            VertexColor::from_hsv(hue, 0.75, 0.95)
        })
        .collect()
}

/// Colors each cloud point by the patch it belongs to.
///
/// Points outside every patch get [`UNASSIGNED_COLOR`]. Indices beyond the
/// cloud are ignored.
pub fn colorize_cloud(cloud: &mut PointCloud, patches: &[SegmentedPlane]) {
    for point in &mut cloud.points {
        point.color = Some(UNASSIGNED_COLOR);
    }
    for (patch, color) in patches.iter().zip(patch_palette(patches.len())) {
        for &i in &patch.indices {
            if let Some(point) = cloud.points.get_mut(i) {
                point.color = Some(color);
            }
        }
    }
}

/// Colors mesh vertices by patch. Boundary vertices shared by several
/// patches take the color of the last one.
pub fn colorize_mesh(mesh: &mut IndexedMesh, patches: &[SegmentedPlane]) {
    mesh.colors = vec![UNASSIGNED_COLOR; mesh.vertices.len()];
    for (patch, color) in patches.iter().zip(patch_palette(patches.len())) {
        for &i in &patch.indices {
            if let Some(slot) = mesh.colors.get_mut(i) {
                *slot = color;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn palette_colors_are_distinct() {
        let colors = patch_palette(12);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(patch_palette(0).is_empty());
    }

    #[test]
    fn cloud_points_take_patch_colors() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(5.0, 5.0, 5.0),
        ];
        let mut cloud = PointCloud::from_positions(&positions);
        let patch = SegmentedPlane::from_indices(&positions, vec![0, 1, 2]).unwrap();

        colorize_cloud(&mut cloud, &[patch]);

        let first = patch_palette(1)[0];
        assert_eq!(cloud.points[0].color, Some(first));
        assert_eq!(cloud.points[2].color, Some(first));
        assert_eq!(cloud.points[3].color, Some(UNASSIGNED_COLOR));
    }

    #[test]
    fn mesh_colors_cover_every_vertex() {
        let mut mesh = IndexedMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        );
        let patch = SegmentedPlane::from_indices(&mesh.vertices, vec![0, 1, 2]).unwrap();

        colorize_mesh(&mut mesh, &[patch]);

        assert_eq!(mesh.colors.len(), 4);
        assert_eq!(mesh.colors[3], UNASSIGNED_COLOR);
        assert_eq!(mesh.colors[1], patch_palette(1)[0]);
    }
}
