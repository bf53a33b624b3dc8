//! What region growing walks over: cloud points or mesh faces.
//!
//! The segmenter grows patches over *elements*. For a point cloud an
//! element is a point and its neighbors come from a [`NeighborQuery`]; for a
//! mesh an element is a face and its neighbors are the faces sharing an
//! edge. Either way each element contributes one or more point indices to
//! the patch, and the final plane is fitted over those points.

use align_cloud::{NeighborQuery, Neighborhood};
use align_types::{IndexedMesh, PointCloud};
use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

use crate::error::{SegmentError, SegmentResult};

/// An element graph the segmenter can grow patches over.
pub trait GrowthDomain {
    /// Positions that patch indices refer to.
    fn positions(&self) -> &[Point3<f64>];

    /// Number of growable elements.
    fn element_count(&self) -> usize;

    /// Unit normal of an element, `None` if it has none (degenerate face).
    fn element_normal(&self, element: usize) -> Option<Vector3<f64>>;

    /// Point indices an element contributes to a patch.
    fn element_points(&self, element: usize) -> &[usize];

    /// Appends the elements adjacent to `element` to `out`, in a stable order.
    fn adjacent(&self, element: usize, out: &mut Vec<usize>);

    /// Seed ordering key; lower seeds first. `None` excludes the element
    /// from seeding (it can still be absorbed by growth).
    fn seed_key(&self, element: usize) -> Option<f64>;

    /// The threshold behind [`GrowthDomain::seed_key`], for error reporting.
    fn seed_threshold(&self) -> f64;
}

/// Growth over the points of a cloud with estimated normals.
pub struct CloudDomain<'a, N: NeighborQuery> {
    positions: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    curvature: Vec<f64>,
    ids: Vec<usize>,
    neighbors: &'a N,
    neighborhood: Neighborhood,
    max_seed_curvature: f64,
}

impl<'a, N: NeighborQuery> CloudDomain<'a, N> {
    /// Wraps a cloud whose normals and curvature have been estimated.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::MissingNormals`] if any point lacks a normal
    /// or curvature, or [`SegmentError::InvalidParameter`] if `neighbors`
    /// does not index this cloud.
    pub fn new(
        cloud: &PointCloud,
        neighbors: &'a N,
        neighborhood: Neighborhood,
        max_seed_curvature: f64,
    ) -> SegmentResult<Self> {
        let missing = cloud
            .points
            .iter()
            .filter(|p| p.normal.is_none() || p.curvature.is_none())
            .count();
        if missing > 0 {
            return Err(SegmentError::MissingNormals {
                missing,
                total: cloud.len(),
            });
        }
        if neighbors.len() != cloud.len() {
            return Err(SegmentError::InvalidParameter(format!(
                "neighbor index holds {} points but the cloud has {}",
                neighbors.len(),
                cloud.len()
            )));
        }

        Ok(Self {
            positions: cloud.positions(),
            normals: cloud
                .points
                .iter()
                .map(|p| p.normal.unwrap_or_else(Vector3::z))
                .collect(),
            curvature: cloud
                .points
                .iter()
                .map(|p| p.curvature.unwrap_or(f64::INFINITY))
                .collect(),
            ids: (0..cloud.len()).collect(),
            neighbors,
            neighborhood,
            max_seed_curvature,
        })
    }
}

impl<N: NeighborQuery> GrowthDomain for CloudDomain<'_, N> {
    fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    fn element_count(&self) -> usize {
        self.positions.len()
    }

    fn element_normal(&self, element: usize) -> Option<Vector3<f64>> {
        Some(self.normals[element])
    }

    fn element_points(&self, element: usize) -> &[usize] {
        std::slice::from_ref(&self.ids[element])
    }

    fn adjacent(&self, element: usize, out: &mut Vec<usize>) {
        out.extend(
            self.neighbors
                .neighbors(&self.positions[element], self.neighborhood),
        );
    }

    fn seed_key(&self, element: usize) -> Option<f64> {
        let curvature = self.curvature[element];
        (curvature <= self.max_seed_curvature).then_some(curvature)
    }

    fn seed_threshold(&self) -> f64 {
        self.max_seed_curvature
    }
}

/// Face adjacency through shared edges.
#[derive(Debug, Clone)]
pub struct FaceAdjacency {
    adjacent: Vec<Vec<usize>>,
}

impl FaceAdjacency {
    /// Builds edge adjacency. Edges shared by more than two faces are
    /// non-manifold and connect nothing.
    #[must_use]
    pub fn from_mesh(mesh: &IndexedMesh) -> Self {
        let mut edge_to_faces: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
        for (face_idx, face) in mesh.faces.iter().enumerate() {
            for i in 0..3 {
                let (v0, v1) = (face[i], face[(i + 1) % 3]);
                let edge = if v0 < v1 { (v0, v1) } else { (v1, v0) };
                edge_to_faces.entry(edge).or_default().push(face_idx);
            }
        }

        let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); mesh.faces.len()];
        for faces in edge_to_faces.values() {
            if let [f0, f1] = faces[..] {
                adjacent[f0].push(f1);
                adjacent[f1].push(f0);
            }
        }
        for list in &mut adjacent {
            list.sort_unstable();
            list.dedup();
        }

        Self { adjacent }
    }

    /// Neighbors of a face, sorted. Empty for an out-of-range face.
    #[must_use]
    pub fn neighbors(&self, face: usize) -> &[usize] {
        self.adjacent.get(face).map_or(&[], Vec::as_slice)
    }
}

/// Growth over the faces of a triangle mesh.
#[derive(Debug, Clone)]
pub struct MeshDomain {
    positions: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
    normals: Vec<Option<Vector3<f64>>>,
    roughness: Vec<f64>,
    adjacency: FaceAdjacency,
    max_seed_roughness: f64,
}

impl MeshDomain {
    /// Prepares a mesh for growth.
    ///
    /// The roughness of a face is the largest angle between its normal and
    /// the normals of its edge neighbors; faces rougher than
    /// `max_seed_roughness` do not seed.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::EmptyMesh`] for a mesh without faces and
    /// [`SegmentError::VertexOutOfBounds`] for an invalid face index.
    pub fn new(mesh: &IndexedMesh, max_seed_roughness: f64) -> SegmentResult<Self> {
        if mesh.faces.is_empty() {
            return Err(SegmentError::EmptyMesh);
        }
        let vertex_count = mesh.vertices.len();
        if let Some(&bad) = mesh
            .faces
            .iter()
            .flatten()
            .find(|&&v| v as usize >= vertex_count)
        {
            return Err(SegmentError::VertexOutOfBounds {
                vertex_idx: bad as usize,
                vertex_count,
            });
        }

        let faces: Vec<[usize; 3]> = mesh
            .faces
            .iter()
            .map(|f| [f[0] as usize, f[1] as usize, f[2] as usize])
            .collect();
        let normals: Vec<Option<Vector3<f64>>> =
            (0..faces.len()).map(|f| mesh.face_normal(f)).collect();
        let adjacency = FaceAdjacency::from_mesh(mesh);

        let roughness = (0..faces.len())
            .map(|f| {
                let Some(n) = normals[f] else {
                    return std::f64::consts::PI;
                };
                adjacency
                    .neighbors(f)
                    .iter()
                    .filter_map(|&g| normals[g])
                    .map(|m| n.dot(&m).clamp(-1.0, 1.0).acos())
                    .fold(0.0, f64::max)
            })
            .collect();

        Ok(Self {
            positions: mesh.vertices.clone(),
            faces,
            normals,
            roughness,
            adjacency,
            max_seed_roughness,
        })
    }

    /// Roughness of a face in radians.
    #[must_use]
    pub fn roughness(&self, face: usize) -> f64 {
        self.roughness[face]
    }
}

impl GrowthDomain for MeshDomain {
    fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    fn element_count(&self) -> usize {
        self.faces.len()
    }

    fn element_normal(&self, element: usize) -> Option<Vector3<f64>> {
        self.normals[element]
    }

    fn element_points(&self, element: usize) -> &[usize] {
        &self.faces[element]
    }

    fn adjacent(&self, element: usize, out: &mut Vec<usize>) {
        out.extend_from_slice(self.adjacency.neighbors(element));
    }

    fn seed_key(&self, element: usize) -> Option<f64> {
        let roughness = self.roughness[element];
        (self.normals[element].is_some() && roughness <= self.max_seed_roughness)
            .then_some(roughness)
    }

    fn seed_threshold(&self) -> f64 {
        self.max_seed_roughness
    }
}
