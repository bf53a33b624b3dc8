//! Region-growing plane segmentation.
//!
//! The segmenter is a small state machine:
//!
//! ```text
//! Idle -> Seeding -> Growing -> Finalizing -> Seeding -> ... -> Done
//!                           \-> Discarding -/
//! ```
//!
//! Seeds are taken in ascending `(seed key, index)` order, so a run is
//! reproducible. Each seed grows breadth-first: a neighbor joins when its
//! normal is within the angle threshold of the patch normal and the
//! residual standard deviation with it included stays within bounds. The
//! plane is re-fitted every `refit_interval` accepted elements. Patches
//! that end below `min_patch_size` points are discarded and their points
//! become available again.
//!
//! [`SegmenterControl`] pauses, resumes or stops a running segmenter from
//! another thread. Pausing is honored between seeds; stopping is honored
//! immediately and drops the patch under construction, leaving the
//! finalized patches intact.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use align_cloud::NeighborQuery;
use align_plane::{Plane, SegmentedPlane};
use align_types::{IndexedMesh, PointCloud};
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::domain::{CloudDomain, GrowthDomain, MeshDomain};
use crate::error::{SegmentError, SegmentResult};
use crate::params::SegmentParams;

/// Per-element bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Not part of any patch.
    Unvisited,
    /// Member of the patch currently growing.
    Queued,
    /// Member of a finalized patch.
    Assigned(usize),
}

/// Segmenter phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Created, no seed taken yet.
    Idle,
    /// Looking for the next seed.
    Seeding,
    /// A patch is growing.
    Growing,
    /// The grown patch is large enough and is being emitted.
    Finalizing,
    /// The grown patch is too small and is being dropped.
    Discarding,
    /// No seed remains, or the segmenter was stopped.
    Done,
}

/// How a call to [`PlaneSegmenter::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every seed was processed.
    Completed,
    /// The running flag was cleared; call `run` again after resuming.
    Paused,
    /// The segmenter was stopped.
    Stopped,
}

/// Shareable pause/stop handle for a segmenter.
///
/// # Example
///
/// ```
/// use align_segment::SegmenterControl;
///
/// let control = SegmenterControl::new();
/// assert!(!control.is_running());
/// control.start_pause();
/// assert!(control.is_running());
/// control.stop();
/// assert!(control.is_stopped());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SegmenterControl {
    running: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl SegmenterControl {
    /// Creates a paused, not stopped control.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles the running flag.
    pub fn start_pause(&self) {
        self.running.fetch_xor(true, Ordering::SeqCst);
    }

    /// Requests a stop. Irreversible.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Returns true while the running flag is set.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns true once a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Counters collected during segmentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentationStats {
    /// Seeds that started a patch.
    pub seeds_used: usize,
    /// Patches emitted.
    pub patches: usize,
    /// Patches dropped for being too small or unfittable.
    pub discarded_patches: usize,
    /// Plane re-fits performed during growth.
    pub refits: usize,
    /// Points covered by emitted patches.
    pub assigned_points: usize,
}

/// Output of a completed segmentation.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Emitted patches, in emission order.
    pub patches: Vec<SegmentedPlane>,
    /// Run counters.
    pub stats: SegmentationStats,
}

/// The patch under construction.
struct Growth {
    elements: Vec<usize>,
    points: Vec<usize>,
    frontier: VecDeque<usize>,
    plane: Plane,
    sum: f64,
    sum_sq: f64,
    since_refit: usize,
}

impl Growth {
    #[allow(clippy::cast_precision_loss)]
    fn std_dev_with(&self, extra_sum: f64, extra_sq: f64, extra: usize) -> f64 {
        let n = (self.points.len() + extra) as f64;
        let mean = (self.sum + extra_sum) / n;
        ((self.sum_sq + extra_sq) / n - mean * mean).max(0.0).sqrt()
    }
}

/// Region-growing plane segmenter over a [`GrowthDomain`].
pub struct PlaneSegmenter<D: GrowthDomain> {
    domain: D,
    params: SegmentParams,
    cos_threshold: f64,
    elements: Vec<ElementState>,
    in_patch: Vec<bool>,
    seeds: Vec<usize>,
    cursor: usize,
    growth: Option<Growth>,
    patches: Vec<SegmentedPlane>,
    state: SegmenterState,
    control: SegmenterControl,
    stats: SegmentationStats,
    scratch: Vec<usize>,
}

impl<'a, N: NeighborQuery> PlaneSegmenter<CloudDomain<'a, N>> {
    /// Segmenter over a cloud whose normals and curvature are estimated.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid parameters, missing normals, a
    /// mismatched neighbor index, or when no point is flat enough to seed.
    pub fn for_cloud(
        cloud: &PointCloud,
        neighbors: &'a N,
        params: SegmentParams,
    ) -> SegmentResult<Self> {
        params.validate()?;
        let domain = CloudDomain::new(
            cloud,
            neighbors,
            params.neighborhood,
            params.max_seed_curvature,
        )?;
        Self::new(domain, params)
    }
}

impl PlaneSegmenter<MeshDomain> {
    /// Segmenter over the faces of a mesh.
    ///
    /// Faces whose roughness exceeds `max_normal_angle` do not seed.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid parameters, an empty or invalid mesh,
    /// or when no face is flat enough to seed.
    pub fn for_mesh(mesh: &IndexedMesh, params: SegmentParams) -> SegmentResult<Self> {
        params.validate()?;
        let domain = MeshDomain::new(mesh, params.max_normal_angle)?;
        Self::new(domain, params)
    }
}

impl<D: GrowthDomain> PlaneSegmenter<D> {
    /// Segmenter over an arbitrary domain.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for invalid parameters and
    /// [`SegmentError::NoEligibleSeeds`] when no element can seed.
    pub fn new(domain: D, params: SegmentParams) -> SegmentResult<Self> {
        params.validate()?;

        let count = domain.element_count();
        let mut keyed: Vec<(f64, usize)> = (0..count)
            .filter_map(|e| domain.seed_key(e).map(|key| (key, e)))
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        if keyed.is_empty() {
            return Err(SegmentError::NoEligibleSeeds {
                elements: count,
                threshold: domain.seed_threshold(),
            });
        }
        debug!(seeds = keyed.len(), elements = count, "seed order established");

        let point_count = domain.positions().len();
        Ok(Self {
            domain,
            params,
            cos_threshold: params.max_normal_angle.cos(),
            elements: vec![ElementState::Unvisited; count],
            in_patch: vec![false; point_count],
            seeds: keyed.into_iter().map(|(_, e)| e).collect(),
            cursor: 0,
            growth: None,
            patches: Vec::new(),
            state: SegmenterState::Idle,
            control: SegmenterControl::new(),
            stats: SegmentationStats::default(),
            scratch: Vec::new(),
        })
    }

    /// Handle for pausing or stopping this segmenter from elsewhere.
    #[must_use]
    pub fn control(&self) -> SegmenterControl {
        self.control.clone()
    }

    /// Toggles the running flag.
    pub fn start_pause(&self) {
        self.control.start_pause();
    }

    /// Stops the segmenter; the patch being grown is dropped.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Current phase.
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Patches finalized so far.
    #[must_use]
    pub fn patches(&self) -> &[SegmentedPlane] {
        &self.patches
    }

    /// Run counters so far.
    #[must_use]
    pub const fn stats(&self) -> SegmentationStats {
        self.stats
    }

    /// State of one element.
    #[must_use]
    pub fn element_state(&self, element: usize) -> Option<ElementState> {
        self.elements.get(element).copied()
    }

    /// Positions the patch indices refer to.
    #[must_use]
    pub fn positions(&self) -> &[Point3<f64>] {
        self.domain.positions()
    }

    /// Consumes the segmenter and returns what it produced.
    #[must_use]
    pub fn into_segmentation(self) -> Segmentation {
        Segmentation {
            patches: self.patches,
            stats: self.stats,
        }
    }

    /// Runs while the running flag is set.
    ///
    /// The running flag is checked only between seeds, so a pause never
    /// splits a patch.
    pub fn run(&mut self) -> RunOutcome {
        loop {
            if self.control.is_stopped() {
                self.halt();
                return RunOutcome::Stopped;
            }
            match self.state {
                SegmenterState::Done => return RunOutcome::Completed,
                SegmenterState::Idle | SegmenterState::Seeding if !self.control.is_running() => {
                    return RunOutcome::Paused;
                }
                _ => self.step(),
            }
        }
    }

    /// Performs one state transition regardless of the running flag.
    pub fn step(&mut self) {
        if self.control.is_stopped() {
            self.halt();
            return;
        }
        self.state = match self.state {
            SegmenterState::Idle => {
                info!(
                    elements = self.elements.len(),
                    seeds = self.seeds.len(),
                    "segmentation started"
                );
                SegmenterState::Seeding
            }
            SegmenterState::Seeding => self.take_seed(),
            SegmenterState::Growing => self.grow(),
            SegmenterState::Finalizing => self.finalize(),
            SegmenterState::Discarding => {
                self.discard();
                SegmenterState::Seeding
            }
            SegmenterState::Done => SegmenterState::Done,
        };
    }

    fn halt(&mut self) {
        if self.growth.is_some() {
            debug!("stop requested, dropping patch under construction");
            self.discard_in_progress();
        }
        self.state = SegmenterState::Done;
    }

    fn take_seed(&mut self) -> SegmenterState {
        while self.cursor < self.seeds.len() {
            let seed = self.seeds[self.cursor];
            self.cursor += 1;
            if self.elements[seed] != ElementState::Unvisited {
                continue;
            }
            let Some(normal) = self.domain.element_normal(seed) else {
                continue;
            };
            let seed_points = self.domain.element_points(seed);
            let Some(anchor) = seed_points.first().map(|&p| self.domain.positions()[p]) else {
                continue;
            };
            let Some(plane) = Plane::from_point_normal(anchor, normal) else {
                continue;
            };

            let mut growth = Growth {
                elements: vec![seed],
                points: Vec::new(),
                frontier: VecDeque::from([seed]),
                plane,
                sum: 0.0,
                sum_sq: 0.0,
                since_refit: 0,
            };
            for &p in seed_points {
                if !self.in_patch[p] {
                    self.in_patch[p] = true;
                    let d = plane.distance_to(&self.domain.positions()[p]);
                    growth.points.push(p);
                    growth.sum += d;
                    growth.sum_sq += d * d;
                }
            }
            self.elements[seed] = ElementState::Queued;
            self.growth = Some(growth);
            self.stats.seeds_used += 1;
            return SegmenterState::Growing;
        }

        info!(
            patches = self.patches.len(),
            discarded = self.stats.discarded_patches,
            assigned = self.stats.assigned_points,
            "segmentation finished"
        );
        SegmenterState::Done
    }

    fn grow(&mut self) -> SegmenterState {
        let Some(mut growth) = self.growth.take() else {
            return SegmenterState::Seeding;
        };

        while let Some(current) = growth.frontier.pop_front() {
            if self.control.is_stopped() {
                self.growth = Some(growth);
                self.halt();
                return SegmenterState::Done;
            }

            self.scratch.clear();
            self.domain.adjacent(current, &mut self.scratch);
            let candidates = std::mem::take(&mut self.scratch);

            for &candidate in &candidates {
                if self.elements[candidate] != ElementState::Unvisited {
                    continue;
                }
                if self.accept(&growth, candidate) {
                    self.absorb(&mut growth, candidate);
                }
            }
            self.scratch = candidates;
        }

        let size = growth.points.len();
        self.growth = Some(growth);
        if size >= self.params.min_patch_size {
            SegmenterState::Finalizing
        } else {
            SegmenterState::Discarding
        }
    }

    fn accept(&self, growth: &Growth, candidate: usize) -> bool {
        let Some(normal) = self.domain.element_normal(candidate) else {
            return false;
        };
        if normal.dot(&growth.plane.normal()).abs() < self.cos_threshold {
            return false;
        }

        let positions = self.domain.positions();
        let (mut extra_sum, mut extra_sq, mut extra) = (0.0, 0.0, 0usize);
        for &p in self.domain.element_points(candidate) {
            if !self.in_patch[p] {
                let d = growth.plane.distance_to(&positions[p]);
                extra_sum += d;
                extra_sq += d * d;
                extra += 1;
            }
        }
        extra == 0 || growth.std_dev_with(extra_sum, extra_sq, extra) <= self.params.max_std_dev
    }

    fn absorb(&mut self, growth: &mut Growth, element: usize) {
        let positions = self.domain.positions();
        for &p in self.domain.element_points(element) {
            if !self.in_patch[p] {
                self.in_patch[p] = true;
                let d = growth.plane.distance_to(&positions[p]);
                growth.points.push(p);
                growth.sum += d;
                growth.sum_sq += d * d;
            }
        }
        self.elements[element] = ElementState::Queued;
        growth.elements.push(element);
        growth.frontier.push_back(element);
        growth.since_refit += 1;

        if growth.since_refit >= self.params.refit_interval {
            growth.since_refit = 0;
            if let Ok(plane) = Plane::fit(positions, &growth.points) {
                growth.plane = plane;
                let (sum, sum_sq) = growth
                    .points
                    .iter()
                    .map(|&p| plane.distance_to(&positions[p]))
                    .fold((0.0, 0.0), |(s, q), d| (s + d, d.mul_add(d, q)));
                growth.sum = sum;
                growth.sum_sq = sum_sq;
                self.stats.refits += 1;
            }
        }
    }

    fn finalize(&mut self) -> SegmenterState {
        let Some(growth) = self.growth.take() else {
            return SegmenterState::Seeding;
        };

        match SegmentedPlane::from_indices(self.domain.positions(), growth.points.clone()) {
            Ok(patch) => {
                let id = self.patches.len();
                for &e in &growth.elements {
                    self.elements[e] = ElementState::Assigned(id);
                }
                for &p in &growth.points {
                    self.in_patch[p] = false;
                }
                debug!(
                    patch = id,
                    points = patch.len(),
                    std_dev = patch.std_dev,
                    "patch finalized"
                );
                self.stats.patches += 1;
                self.stats.assigned_points += patch.len();
                self.patches.push(patch);
                SegmenterState::Seeding
            }
            Err(err) => {
                warn!(points = growth.points.len(), error = %err, "patch could not be fitted");
                self.growth = Some(growth);
                SegmenterState::Discarding
            }
        }
    }

    fn discard(&mut self) {
        if let Some(growth) = &self.growth {
            debug!(points = growth.points.len(), "patch below minimum size discarded");
        }
        self.discard_in_progress();
        self.stats.discarded_patches += 1;
    }

    fn discard_in_progress(&mut self) {
        if let Some(growth) = self.growth.take() {
            for &e in &growth.elements {
                self.elements[e] = ElementState::Unvisited;
            }
            for &p in &growth.points {
                self.in_patch[p] = false;
            }
        }
    }
}

/// Segments a cloud to completion.
///
/// # Errors
///
/// See [`PlaneSegmenter::for_cloud`].
///
/// # Example
///
/// ```
/// use align_cloud::{estimate_normals, KdNeighbors, NormalParams};
/// use align_segment::{segment_cloud, SegmentParams};
/// use align_types::PointCloud;
/// use nalgebra::Point3;
///
/// let positions: Vec<_> = (0..900)
///     .map(|i| {
///         let t = f64::from(i);
///         Point3::new(
///             (t * 0.618_034).fract(),
///             (t * 0.414_214).fract(),
///             1e-4 * (t * 0.732_051).fract(),
///         )
///     })
///     .collect();
/// let index = KdNeighbors::new(&positions);
/// let mut cloud = PointCloud::from_positions(&positions);
/// estimate_normals(&mut cloud, &index, &NormalParams::default()).unwrap();
///
/// let result = segment_cloud(&cloud, &index, SegmentParams::default()).unwrap();
/// assert!(result.patches[0].normal().z.abs() > 0.99);
/// ```
pub fn segment_cloud<N: NeighborQuery>(
    cloud: &PointCloud,
    neighbors: &N,
    params: SegmentParams,
) -> SegmentResult<Segmentation> {
    let mut segmenter = PlaneSegmenter::for_cloud(cloud, neighbors, params)?;
    segmenter.start_pause();
    segmenter.run();
    Ok(segmenter.into_segmentation())
}

/// Segments a mesh to completion. Patch indices are vertex indices.
///
/// # Errors
///
/// See [`PlaneSegmenter::for_mesh`].
pub fn segment_mesh(mesh: &IndexedMesh, params: SegmentParams) -> SegmentResult<Segmentation> {
    let mut segmenter = PlaneSegmenter::for_mesh(mesh, params)?;
    segmenter.start_pause();
    segmenter.run();
    Ok(segmenter.into_segmentation())
}
