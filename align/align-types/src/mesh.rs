//! Indexed triangle mesh.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Aabb, RigidTransform, VertexColor};

/// An indexed triangle mesh.
///
/// Faces reference vertices by index and use counter-clockwise winding
/// when viewed from outside.
///
/// # Example
///
/// ```
/// use align_types::{IndexedMesh, Point3};
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Point3::new(0.0, 0.0, 0.0));
/// mesh.vertices.push(Point3::new(1.0, 0.0, 0.0));
/// mesh.vertices.push(Point3::new(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// assert_eq!(mesh.face_count(), 1);
/// assert!((mesh.face_area(0) - 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexedMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,

    /// Per-vertex colors. Either empty or the same length as `vertices`.
    pub colors: Vec<VertexColor>,

    /// Triangle faces as indices into the vertex array.
    pub faces: Vec<[u32; 3]>,
}

impl IndexedMesh {
    /// Create a new empty mesh.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            colors: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create a mesh from vertex positions and faces.
    #[must_use]
    pub const fn from_parts(vertices: Vec<Point3<f64>>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            colors: Vec::new(),
            faces,
        }
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces.
    #[inline]
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Returns true if the mesh has no faces.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// The three corner positions of a face.
    ///
    /// # Panics
    ///
    /// Panics if `face` is out of range or references a missing vertex.
    #[must_use]
    pub fn face_positions(&self, face: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.faces[face];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    /// Unit normal of a face, or `None` for a degenerate triangle.
    #[must_use]
    pub fn face_normal(&self, face: usize) -> Option<Vector3<f64>> {
        let [a, b, c] = self.face_positions(face);
        (b - a).cross(&(c - a)).try_normalize(f64::EPSILON)
    }

    /// Area of a face.
    #[must_use]
    pub fn face_area(&self, face: usize) -> f64 {
        let [a, b, c] = self.face_positions(face);
        (b - a).cross(&(c - a)).norm() * 0.5
    }

    /// Centroid of a face.
    #[must_use]
    pub fn face_centroid(&self, face: usize) -> Point3<f64> {
        let [a, b, c] = self.face_positions(face);
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Bounding box of all vertices.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter())
    }

    /// Applies a rigid transform to every vertex in place.
    pub fn transform(&mut self, transform: &RigidTransform) {
        for vertex in &mut self.vertices {
            *vertex = transform.transform_point(vertex);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> IndexedMesh {
        IndexedMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn face_geometry() {
        let mesh = unit_square();
        assert_eq!(mesh.vertex_count(), 4);
        assert_relative_eq!(mesh.face_normal(0).unwrap(), Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(mesh.face_area(0) + mesh.face_area(1), 1.0, epsilon = 1e-12);
        let c = mesh.face_centroid(1);
        assert_relative_eq!(c.x, 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(c.y, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_face_has_no_normal() {
        let mesh = IndexedMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        assert!(mesh.face_normal(0).is_none());
    }

    #[test]
    fn transform_moves_vertices() {
        let mut mesh = unit_square();
        mesh.transform(&RigidTransform::from_translation(Vector3::new(0.0, 0.0, 3.0)));
        assert_relative_eq!(mesh.bounds().min.z, 3.0);
        assert_relative_eq!(mesh.bounds().diagonal(), 2.0_f64.sqrt(), epsilon = 1e-12);
    }
}
