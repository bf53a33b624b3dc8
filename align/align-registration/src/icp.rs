//! Iterative Closest Point (ICP) polish of a plane-based alignment.
//!
//! ICP iteratively refines the alignment between two point sets by:
//! 1. Finding closest point correspondences
//! 2. Computing the optimal rigid transform for those correspondences
//! 3. Applying the transform and repeating until convergence
//!
//! The RMS correspondence distance never increases across accepted
//! iterations: a step that would increase it is rejected and ends the loop,
//! leaving the best transform found in place.

use align_cloud::{KdNeighbors, NeighborQuery};
use align_types::RigidTransform;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, RegistrationResult};
use crate::kabsch::compute_rigid_transform;

/// Parameters for ICP registration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IcpParams {
    /// Maximum number of iterations (default: 50).
    pub max_iterations: u32,
    /// Convergence threshold for RMS error change (default: 1e-6).
    pub convergence_threshold: f64,
    /// Maximum correspondence distance. Points farther than this are rejected.
    /// `None` means no distance filtering (default: `None`).
    pub max_correspondence_distance: Option<f64>,
    /// Subsample ratio for large clouds (0.0-1.0, default: 1.0 = no subsampling).
    pub subsample_ratio: f64,
    /// Initial transform guess (default: identity).
    pub initial_transform: RigidTransform,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence_threshold: 1e-6,
            max_correspondence_distance: None,
            subsample_ratio: 1.0,
            initial_transform: RigidTransform::identity(),
        }
    }
}

impl IcpParams {
    /// Creates new ICP parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fewer iterations on a quarter of the source points.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_iterations: 20,
            convergence_threshold: 1e-5,
            subsample_ratio: 0.25,
            ..Self::default()
        }
    }

    /// Sets the maximum number of iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence threshold.
    #[must_use]
    pub const fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Sets the maximum correspondence distance.
    #[must_use]
    pub const fn with_max_correspondence_distance(mut self, distance: f64) -> Self {
        self.max_correspondence_distance = Some(distance);
        self
    }

    /// Sets the subsample ratio (0.0-1.0).
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // clamp is not const fn
    pub fn with_subsample_ratio(mut self, ratio: f64) -> Self {
        self.subsample_ratio = ratio.clamp(0.01, 1.0);
        self
    }

    /// Sets the initial transform guess.
    #[must_use]
    pub const fn with_initial_transform(mut self, transform: RigidTransform) -> Self {
        self.initial_transform = transform;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidParameter`] for out-of-range values.
    pub fn validate(&self) -> RegistrationResult<()> {
        if self.max_iterations == 0 {
            return Err(RegistrationError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold >= 0.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "convergence_threshold must be non-negative, got {}",
                self.convergence_threshold
            )));
        }
        if let Some(d) = self.max_correspondence_distance {
            if d.is_nan() || d <= 0.0 {
                return Err(RegistrationError::InvalidParameter(format!(
                    "max_correspondence_distance must be positive, got {d}"
                )));
            }
        }
        if !(self.subsample_ratio > 0.0 && self.subsample_ratio <= 1.0) {
            return Err(RegistrationError::InvalidParameter(format!(
                "subsample_ratio must be in (0, 1], got {}",
                self.subsample_ratio
            )));
        }
        Ok(())
    }
}

/// Result of ICP registration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IcpResult {
    /// The accumulated transform from source to target, including the
    /// initial transform.
    pub transform: RigidTransform,
    /// Final RMS error after registration.
    pub rms_error: f64,
    /// Maximum error across all correspondences.
    pub max_error: f64,
    /// Number of iterations performed.
    pub iterations: u32,
    /// Whether the error settled before the iteration cap.
    pub converged: bool,
    /// Number of valid correspondences in the final iteration.
    pub correspondence_count: usize,
    /// RMS error before the first iteration and after every accepted one;
    /// never increasing.
    pub error_history: Vec<f64>,
}

/// Aligns source points to target points using ICP.
///
/// Builds a KD-tree over `target_points`; use [`icp_align_indexed`] to
/// reuse an existing index.
///
/// # Errors
///
/// Returns an error if:
/// - Either point set is empty
/// - The parameters are invalid
/// - No valid correspondences found
/// - SVD computation fails
///
/// # Example
///
/// ```
/// use align_registration::{icp_align_points, IcpParams};
/// use nalgebra::{Point3, Vector3};
///
/// let source: Vec<Point3<f64>> = (0..40)
///     .map(|i| {
///         let t = f64::from(i);
///         Point3::new((t * 0.37).sin(), (t * 0.71).cos(), (t * 0.13).sin())
///     })
///     .collect();
/// let shift = Vector3::new(0.05, -0.02, 0.03);
/// let target: Vec<_> = source.iter().map(|p| p + shift).collect();
///
/// let result = icp_align_points(&source, &target, &IcpParams::default()).unwrap();
/// assert!(result.rms_error < 1e-6);
/// ```
pub fn icp_align_points(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    params: &IcpParams,
) -> RegistrationResult<IcpResult> {
    if target_points.is_empty() {
        return Err(RegistrationError::EmptyTargetMesh);
    }
    let index = KdNeighbors::new(target_points);
    icp_align_indexed(source_points, target_points, &index, params)
}

/// Aligns source points to target points using ICP with a prebuilt index
/// over `target_points`.
///
/// The index and target points are only read, so one target can serve many
/// concurrent alignments.
///
/// # Errors
///
/// See [`icp_align_points`]. Also returns
/// [`RegistrationError::InvalidParameter`] if the index does not cover
/// `target_points`.
pub fn icp_align_indexed<N: NeighborQuery>(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    target_index: &N,
    params: &IcpParams,
) -> RegistrationResult<IcpResult> {
    params.validate()?;
    if source_points.is_empty() {
        return Err(RegistrationError::EmptySourceMesh);
    }
    if target_points.is_empty() {
        return Err(RegistrationError::EmptyTargetMesh);
    }
    if target_index.len() != target_points.len() {
        return Err(RegistrationError::InvalidParameter(format!(
            "target index holds {} points but {} target points were given",
            target_index.len(),
            target_points.len()
        )));
    }

    let source = subsample(source_points, params.subsample_ratio);
    let max_distance = params.max_correspondence_distance.unwrap_or(f64::INFINITY);

    let mut current = params.initial_transform;
    let mut state = evaluate(&source, &current, target_points, target_index, max_distance);
    if state.correspondences.is_empty() {
        return Err(RegistrationError::NoCorrespondences);
    }

    let mut history = vec![state.rms];
    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..params.max_iterations {
        iterations = iter + 1;

        let (matched_source, matched_target): (Vec<Point3<f64>>, Vec<Point3<f64>>) = state
            .correspondences
            .iter()
            .map(|c| (current.transform_point(&source[c.source_idx]), c.target_point))
            .unzip();
        let incremental = compute_rigid_transform(&matched_source, &matched_target)?;
        let candidate = incremental.compose(&current);

        let next = evaluate(&source, &candidate, target_points, target_index, max_distance);
        if next.correspondences.is_empty() {
            warn!(iteration = iterations, "ICP step lost all correspondences, rejected");
            break;
        }
        if next.rms > state.rms {
            debug!(
                iteration = iterations,
                before = state.rms,
                after = next.rms,
                "ICP step would increase error, rejected"
            );
            converged = next.rms - state.rms <= params.convergence_threshold;
            break;
        }

        let improvement = state.rms - next.rms;
        current = candidate;
        state = next;
        history.push(state.rms);

        if improvement < params.convergence_threshold {
            converged = true;
            break;
        }
    }

    if converged {
        info!(iterations, rms = state.rms, "ICP converged");
    } else {
        warn!(iterations, rms = state.rms, "ICP stopped without converging");
    }

    Ok(IcpResult {
        transform: current,
        rms_error: state.rms,
        max_error: state.max,
        iterations,
        converged,
        correspondence_count: state.correspondences.len(),
        error_history: history,
    })
}

/// A point correspondence between source and target.
#[derive(Debug, Clone, Copy)]
struct Correspondence {
    source_idx: usize,
    target_point: Point3<f64>,
    distance: f64,
}

/// Correspondences and error metrics under one transform.
struct Evaluation {
    correspondences: Vec<Correspondence>,
    rms: f64,
    max: f64,
}

fn evaluate<N: NeighborQuery>(
    source: &[Point3<f64>],
    transform: &RigidTransform,
    target_points: &[Point3<f64>],
    target_index: &N,
    max_distance: f64,
) -> Evaluation {
    let correspondences =
        find_correspondences(source, transform, target_points, target_index, max_distance);
    let (rms, max) = compute_error_metrics(&correspondences);
    Evaluation {
        correspondences,
        rms,
        max,
    }
}

/// Gets source points, optionally subsampled.
fn subsample(points: &[Point3<f64>], subsample_ratio: f64) -> Vec<Point3<f64>> {
    if subsample_ratio >= 1.0 {
        points.to_vec()
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let step = (1.0 / subsample_ratio).ceil() as usize;
        points.iter().step_by(step.max(1)).copied().collect()
    }
}

/// Finds closest point correspondences.
fn find_correspondences<N: NeighborQuery>(
    source: &[Point3<f64>],
    transform: &RigidTransform,
    target_points: &[Point3<f64>],
    target_index: &N,
    max_distance: f64,
) -> Vec<Correspondence> {
    source
        .par_iter()
        .enumerate()
        .filter_map(|(idx, p)| {
            let moved = transform.transform_point(p);
            let (target_idx, distance) = target_index.nearest(&moved)?;
            (distance <= max_distance).then(|| Correspondence {
                source_idx: idx,
                target_point: target_points[target_idx],
                distance,
            })
        })
        .collect()
}

/// Computes RMS and max error from correspondences.
fn compute_error_metrics(correspondences: &[Correspondence]) -> (f64, f64) {
    if correspondences.is_empty() {
        return (f64::MAX, f64::MAX);
    }

    let sum_sq: f64 = correspondences.iter().map(|c| c.distance * c.distance).sum();
    let max = correspondences
        .iter()
        .map(|c| c.distance)
        .fold(0.0, f64::max);

    #[allow(clippy::cast_precision_loss)]
    let rms = (sum_sq / correspondences.len() as f64).sqrt();

    (rms, max)
}
