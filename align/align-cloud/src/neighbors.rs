//! Nearest-neighbor queries over a fixed point set.
//!
//! Segmentation, merging and ICP only ever need three questions answered
//! about a cloud: the `k` closest points, the points within a radius, and
//! the single closest point. [`NeighborQuery`] captures exactly that, and
//! [`KdNeighbors`] answers it with an immutable kiddo KD-tree, which stays
//! valid when many points share a coordinate (flat scans, grid meshes).
//!
//! Every result list is ordered by `(distance, index)`, so a query gives
//! the same answer on every run regardless of tree layout.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the local neighborhood of a point is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Neighborhood {
    /// The `k` nearest points (including the query point itself when it
    /// belongs to the cloud).
    Nearest(usize),
    /// All points within the given Euclidean radius.
    Radius(f64),
}

/// Read-only neighbor lookup over the points of one cloud.
///
/// Implementations must be shareable across rayon workers.
pub trait NeighborQuery: Sync {
    /// Number of indexed points.
    fn len(&self) -> usize;

    /// Returns true if no point is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices of the `k` nearest points, closest first.
    fn nearest_k(&self, point: &Point3<f64>, k: usize) -> Vec<usize>;

    /// Indices of all points within `radius`, closest first.
    fn within_radius(&self, point: &Point3<f64>, radius: f64) -> Vec<usize>;

    /// Index of and Euclidean distance to the closest point.
    fn nearest(&self, point: &Point3<f64>) -> Option<(usize, f64)>;

    /// Dispatches on a [`Neighborhood`].
    fn neighbors(&self, point: &Point3<f64>, neighborhood: Neighborhood) -> Vec<usize> {
        match neighborhood {
            Neighborhood::Nearest(k) => self.nearest_k(point, k),
            Neighborhood::Radius(r) => self.within_radius(point, r),
        }
    }
}

/// KD-tree backed [`NeighborQuery`].
///
/// # Example
///
/// ```
/// use align_cloud::{KdNeighbors, NeighborQuery};
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.1, 0.0),
///     Point3::new(5.0, 0.2, 0.3),
/// ];
/// let index = KdNeighbors::new(&points);
///
/// assert_eq!(index.nearest_k(&Point3::new(0.9, 0.0, 0.0), 2), vec![1, 0]);
/// assert_eq!(index.nearest(&Point3::new(4.0, 0.0, 0.0)).map(|(i, _)| i), Some(2));
/// ```
pub struct KdNeighbors {
    tree: ImmutableKdTree<f64, 3>,
    len: usize,
}

impl KdNeighbors {
    /// Builds the tree; point `i` is reported as index `i`.
    #[must_use]
    pub fn new(points: &[Point3<f64>]) -> Self {
        let coords: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
        Self {
            tree: ImmutableKdTree::new_from_slice(&coords),
            len: points.len(),
        }
    }
}

impl std::fmt::Debug for KdNeighbors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdNeighbors").field("len", &self.len).finish()
    }
}

#[allow(clippy::cast_possible_truncation)]
// Items are indices inserted from usize, so they fit back into usize
fn sorted_indices(mut found: Vec<(f64, u64)>) -> Vec<usize> {
    found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    found.into_iter().map(|(_, item)| item as usize).collect()
}

impl NeighborQuery for KdNeighbors {
    fn len(&self) -> usize {
        self.len
    }

    fn nearest_k(&self, point: &Point3<f64>, k: usize) -> Vec<usize> {
        if k == 0 || self.len == 0 {
            return Vec::new();
        }
        let found = self
            .tree
            .nearest_n::<SquaredEuclidean>(&[point.x, point.y, point.z], k)
            .into_iter()
            .map(|n| (n.distance, n.item))
            .collect();
        sorted_indices(found)
    }

    fn within_radius(&self, point: &Point3<f64>, radius: f64) -> Vec<usize> {
        if self.len == 0 || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let found = self
            .tree
            .within::<SquaredEuclidean>(&[point.x, point.y, point.z], radius * radius)
            .into_iter()
            .map(|n| (n.distance, n.item))
            .collect();
        sorted_indices(found)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn nearest(&self, point: &Point3<f64>) -> Option<(usize, f64)> {
        if self.len == 0 {
            return None;
        }
        let found = self
            .tree
            .nearest_one::<SquaredEuclidean>(&[point.x, point.y, point.z]);
        Some((found.item as usize, found.distance.sqrt()))
    }
}
