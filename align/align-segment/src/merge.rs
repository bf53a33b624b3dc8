//! Merging of adjacent coplanar patches.
//!
//! Merging runs a worklist to a fixpoint. Every adjacent pair is queued
//! once; a pair that passes the coplanarity test is replaced by a fresh
//! patch (new slot id, re-fitted plane) and every neighbor of the merged
//! patch is queued against it. Pairs whose slots have since been merged
//! away are skipped when popped. Each merge removes one patch, so the loop
//! ends after at most `n - 1` merges, and since every surviving adjacent
//! pair was last tested with its final planes, merging the output again
//! changes nothing.

use std::collections::{BTreeSet, VecDeque};

use align_cloud::NeighborQuery;
use align_plane::SegmentedPlane;
use hashbrown::HashMap;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{SegmentError, SegmentResult};
use crate::params::MergeParams;

/// Merges adjacent, statistically coplanar patches.
///
/// # Example
///
/// ```
/// use align_plane::SegmentedPlane;
/// use align_segment::{MergeParams, PlaneMerger};
/// use nalgebra::Point3;
///
/// // Two squares of the same plane sharing the edge x = 1.
/// let points: Vec<_> = [0.0, 1.0, 2.0]
///     .iter()
///     .flat_map(|&x| [Point3::new(x, 0.0, 0.0), Point3::new(x, 1.0, 0.0)])
///     .collect();
/// let left = SegmentedPlane::from_indices(&points, vec![0, 1, 2, 3]).unwrap();
/// let right = SegmentedPlane::from_indices(&points, vec![2, 3, 4, 5]).unwrap();
///
/// let merger = PlaneMerger::new(MergeParams::default()).unwrap();
/// let merged = merger.merge_shared_points(&points, vec![left, right]);
/// assert_eq!(merged.len(), 1);
/// assert_eq!(merged[0].indices, vec![0, 1, 2, 3, 4, 5]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PlaneMerger {
    params: MergeParams,
}

impl PlaneMerger {
    /// Creates a merger.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for invalid parameters.
    pub fn new(params: MergeParams) -> SegmentResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The parameters in use.
    #[must_use]
    pub const fn params(&self) -> &MergeParams {
        &self.params
    }

    /// Coplanarity test for two patches.
    ///
    /// The normals must be within `max_angle` of each other (ignoring
    /// orientation) and each centroid within the noise-scaled distance of
    /// the other plane.
    #[must_use]
    pub fn are_coplanar(&self, a: &SegmentedPlane, b: &SegmentedPlane) -> bool {
        if a.plane.angle_to(&b.plane) > self.params.max_angle {
            return false;
        }
        let tolerance = self
            .params
            .base_distance
            .max(self.params.std_dev_scale * (a.std_dev + b.std_dev));
        let offset = a
            .plane
            .distance_to(&b.centroid())
            .max(b.plane.distance_to(&a.centroid()));
        offset <= tolerance
    }

    /// Merges patches that share point indices, as mesh patches do along
    /// their common boundary.
    #[must_use]
    pub fn merge_shared_points(
        &self,
        positions: &[Point3<f64>],
        patches: Vec<SegmentedPlane>,
    ) -> Vec<SegmentedPlane> {
        let adjacency = shared_point_adjacency(&patches);
        self.merge_with_adjacency(positions, patches, adjacency)
    }

    /// Merges cloud patches whose points come within `proximity` of each
    /// other.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] if `neighbors` does not
    /// index `positions` or a patch index is out of range.
    pub fn merge_by_proximity<N: NeighborQuery>(
        &self,
        positions: &[Point3<f64>],
        neighbors: &N,
        patches: Vec<SegmentedPlane>,
    ) -> SegmentResult<Vec<SegmentedPlane>> {
        if neighbors.len() != positions.len() {
            return Err(SegmentError::InvalidParameter(format!(
                "neighbor index holds {} points but {} positions were given",
                neighbors.len(),
                positions.len()
            )));
        }
        let adjacency =
            proximity_adjacency(positions, neighbors, &patches, self.params.proximity)?;
        Ok(self.merge_with_adjacency(positions, patches, adjacency))
    }

    /// Merges with a caller-supplied adjacency: `adjacency[i]` lists the
    /// patches adjacent to patch `i`. Out-of-range entries are ignored and
    /// the relation is made symmetric.
    #[must_use]
    pub fn merge_with_adjacency(
        &self,
        positions: &[Point3<f64>],
        patches: Vec<SegmentedPlane>,
        adjacency: Vec<BTreeSet<usize>>,
    ) -> Vec<SegmentedPlane> {
        let initial = patches.len();
        let mut slots: Vec<Option<SegmentedPlane>> = patches.into_iter().map(Some).collect();

        let mut links: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); initial];
        for (a, set) in adjacency.iter().enumerate().take(initial) {
            for &b in set {
                if b < initial && b != a {
                    links[a].insert(b);
                    links[b].insert(a);
                }
            }
        }

        let mut queue: VecDeque<(usize, usize)> = links
            .iter()
            .enumerate()
            .flat_map(|(a, set)| set.range(a + 1..).map(move |&b| (a, b)))
            .collect();

        let mut merges = 0usize;
        while let Some((a, b)) = queue.pop_front() {
            let (Some(pa), Some(pb)) = (&slots[a], &slots[b]) else {
                continue;
            };
            if !self.are_coplanar(pa, pb) {
                continue;
            }
            let merged = match pa.merged(pb, positions) {
                Ok(merged) => merged,
                Err(err) => {
                    debug!(a, b, error = %err, "merge refit failed, pair kept apart");
                    continue;
                }
            };

            let id = slots.len();
            debug!(a, b, id, points = merged.len(), "patches merged");
            slots[a] = None;
            slots[b] = None;
            slots.push(Some(merged));
            merges += 1;

            let mut around: BTreeSet<usize> = &links[a] | &links[b];
            around.remove(&a);
            around.remove(&b);
            links[a].clear();
            links[b].clear();
            for &n in &around {
                links[n].remove(&a);
                links[n].remove(&b);
                links[n].insert(id);
                queue.push_back((n, id));
            }
            links.push(around);
        }

        let merged: Vec<SegmentedPlane> = slots.into_iter().flatten().collect();
        info!(initial, merges, remaining = merged.len(), "patch merge finished");
        merged
    }
}

/// Adjacency through shared point indices.
fn shared_point_adjacency(patches: &[SegmentedPlane]) -> Vec<BTreeSet<usize>> {
    let mut owners: HashMap<usize, Vec<usize>> = HashMap::new();
    for (patch_idx, patch) in patches.iter().enumerate() {
        for &i in &patch.indices {
            owners.entry(i).or_default().push(patch_idx);
        }
    }

    let mut adjacency = vec![BTreeSet::new(); patches.len()];
    for list in owners.values().filter(|l| l.len() > 1) {
        for (k, &a) in list.iter().enumerate() {
            for &b in &list[k + 1..] {
                adjacency[a].insert(b);
                adjacency[b].insert(a);
            }
        }
    }
    adjacency
}

/// Adjacency through spatial proximity of member points.
fn proximity_adjacency<N: NeighborQuery>(
    positions: &[Point3<f64>],
    neighbors: &N,
    patches: &[SegmentedPlane],
    proximity: f64,
) -> SegmentResult<Vec<BTreeSet<usize>>> {
    let mut labels: Vec<Option<usize>> = vec![None; positions.len()];
    for (patch_idx, patch) in patches.iter().enumerate() {
        for &i in &patch.indices {
            let slot = labels.get_mut(i).ok_or_else(|| {
                SegmentError::InvalidParameter(format!(
                    "patch {patch_idx} references point {i} of {}",
                    positions.len()
                ))
            })?;
            *slot = Some(patch_idx);
        }
    }

    Ok(patches
        .par_iter()
        .enumerate()
        .map(|(patch_idx, patch)| {
            let mut touching = BTreeSet::new();
            for &i in &patch.indices {
                for j in neighbors.within_radius(&positions[i], proximity) {
                    if let Some(other) = labels[j] {
                        if other != patch_idx {
                            touching.insert(other);
                        }
                    }
                }
            }
            touching
        })
        .collect())
}
