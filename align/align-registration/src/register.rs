//! Staged plane-based registration.
//!
//! Three stages each produce a transform composed onto the previous ones:
//!
//! 1. **Coarse**: the [`PlaneMatcher`] correspondence, solved with
//!    [`compute_plane_transform`].
//! 2. **Refinement**: with the coarse transform applied, every source patch
//!    is re-matched to the closest compatible target patch under tighter
//!    tolerances, and the solve is repeated over all of those pairs.
//! 3. **ICP**: point-level polish of the plane-aligned source points.
//!
//! Only a failed correspondence search is an error. A failed refinement or
//! ICP stage leaves the earlier transform in place and lowers the reported
//! [`Confidence`].

use align_cloud::{KdNeighbors, NeighborQuery};
use align_plane::{Plane, SegmentedPlane};
use align_types::RigidTransform;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, RegistrationResult};
use crate::icp::{IcpParams, IcpResult, icp_align_indexed};
use crate::kabsch::{PlaneObservation, compute_plane_transform};
use crate::matcher::PlaneMatcher;
use crate::params::{MIN_PLANE_PAIRS, RefineParams, RegistrationParams};

/// Points and the planar patches segmented from them.
#[derive(Debug, Clone, Copy)]
pub struct PlaneScene<'a> {
    /// Point positions (cloud points or mesh vertices).
    pub points: &'a [Point3<f64>],
    /// Patches whose indices refer to `points`.
    pub patches: &'a [SegmentedPlane],
}

impl<'a> PlaneScene<'a> {
    /// Bundles points and patches.
    #[must_use]
    pub const fn new(points: &'a [Point3<f64>], patches: &'a [SegmentedPlane]) -> Self {
        Self { points, patches }
    }
}

/// How far a registration got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Confidence {
    /// Every stage completed and ICP converged.
    Full,
    /// A later stage failed or ICP hit its iteration cap; the transform is
    /// the best one reached.
    Reduced,
}

/// A plane pair backing the final transform.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchedPair {
    /// Source patch index.
    pub source: usize,
    /// Target patch index.
    pub target: usize,
    /// Discrepancy reported by the stage that produced the pair.
    pub score: f64,
    /// Distance between the transformed source centroid and the target
    /// centroid.
    pub residual_distance: f64,
}

/// Result of [`register_planes`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaneRegistration {
    /// Source-to-target transform: `icp_transform ∘ refinement ∘ coarse`.
    pub transform: RigidTransform,
    /// Coarse plane solve.
    pub coarse: RigidTransform,
    /// Correction found by the refinement stage.
    pub refinement: RigidTransform,
    /// Correction found by ICP.
    pub icp_transform: RigidTransform,
    /// Pairs of the last successful plane stage.
    pub pairs: Vec<MatchedPair>,
    /// ICP details, `None` when the ICP stage failed.
    pub icp: Option<IcpResult>,
    /// Overall confidence.
    pub confidence: Confidence,
}

impl PlaneRegistration {
    /// Mean of the pair residual distances.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_residual_distance(&self) -> f64 {
        if self.pairs.is_empty() {
            return 0.0;
        }
        self.pairs.iter().map(|p| p.residual_distance).sum::<f64>() / self.pairs.len() as f64
    }

    /// The plane-level transform, before ICP.
    #[must_use]
    pub fn plane_transform(&self) -> RigidTransform {
        self.refinement.compose(&self.coarse)
    }
}

/// Registers `source` onto `target`.
///
/// Builds a KD-tree over the target points; use [`register_planes_indexed`]
/// to share one index between many sources.
///
/// # Errors
///
/// Returns [`RegistrationError::EmptyTargetMesh`] for a target without
/// points, and otherwise the errors of [`register_planes_indexed`].
///
/// # Example
///
/// ```
/// use align_plane::SegmentedPlane;
/// use align_registration::{register_planes, PlaneScene, RegistrationParams};
/// use align_types::RigidTransform;
/// use nalgebra::{Point3, UnitQuaternion, Vector3};
///
/// // Three faces of a box corner with unequal sizes.
/// let mut points = Vec::new();
/// let mut groups = Vec::new();
/// for (axis, (su, sv)) in [(1.0, 2.0), (2.0, 3.0), (3.0, 1.0)].into_iter().enumerate() {
///     let start = points.len();
///     for i in 0..200 {
///         let t = f64::from(i);
///         let (u, v) = ((t * 0.618_034).fract() * su, (t * 0.414_214).fract() * sv);
///         let mut c = [0.0; 3];
///         c[(axis + 1) % 3] = u;
///         c[(axis + 2) % 3] = v;
///         points.push(Point3::new(c[0], c[1], c[2]));
///     }
///     groups.push((start..points.len()).collect::<Vec<_>>());
/// }
///
/// let truth = RigidTransform::new(
///     UnitQuaternion::from_euler_angles(0.2, -0.1, 0.5),
///     Vector3::new(1.0, 0.5, -0.3),
/// );
/// let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
///
/// let patches = |pts: &[Point3<f64>]| -> Vec<SegmentedPlane> {
///     groups
///         .iter()
///         .map(|g| SegmentedPlane::from_indices(pts, g.clone()).unwrap())
///         .collect()
/// };
/// let (source_patches, target_patches) = (patches(&points), patches(&moved));
///
/// let result = register_planes(
///     &PlaneScene::new(&points, &source_patches),
///     &PlaneScene::new(&moved, &target_patches),
///     &RegistrationParams::default(),
/// )
/// .unwrap();
///
/// assert!(result.transform.inverse().compose(&truth).rotation_angle() < 1e-6);
/// assert!((result.transform.translation - truth.translation).norm() < 1e-6);
/// ```
pub fn register_planes(
    source: &PlaneScene<'_>,
    target: &PlaneScene<'_>,
    params: &RegistrationParams,
) -> RegistrationResult<PlaneRegistration> {
    if target.points.is_empty() {
        return Err(RegistrationError::EmptyTargetMesh);
    }
    let index = KdNeighbors::new(target.points);
    register_planes_indexed(source, target, &index, params)
}

/// Registers `source` onto `target` using a prebuilt index over the target
/// points.
///
/// The target is only read, so concurrent registrations of different
/// sources may share it.
///
/// # Errors
///
/// Returns an error if:
/// - The parameters are invalid
/// - Either scene has no patches
/// - Fewer than three consistent plane pairs exist
///   ([`RegistrationError::InsufficientCorrespondences`])
/// - The matched normals cannot fix a rotation
pub fn register_planes_indexed<N: NeighborQuery>(
    source: &PlaneScene<'_>,
    target: &PlaneScene<'_>,
    target_index: &N,
    params: &RegistrationParams,
) -> RegistrationResult<PlaneRegistration> {
    params.validate()?;
    if source.patches.is_empty() {
        return Err(RegistrationError::EmptySourceMesh);
    }
    if target.patches.is_empty() {
        return Err(RegistrationError::EmptyTargetMesh);
    }

    // Stage 1: correspondence search and coarse solve.
    let matching = PlaneMatcher::new(params.matching)?.find(source.patches, target.patches)?;
    let (src_obs, tgt_obs) = matching.observations(source.patches, target.patches);
    let coarse = compute_plane_transform(&src_obs, &tgt_obs)?;
    info!(
        pairs = matching.pairs.len(),
        rotation_deg = coarse.rotation_angle().to_degrees(),
        "coarse plane alignment"
    );

    let mut confidence = Confidence::Full;

    // Stage 2: proximity re-matching.
    let (refinement, scored) =
        match refine(source.patches, target.patches, &coarse, &params.refine) {
            Ok((delta, scored)) => {
                info!(
                    pairs = scored.len(),
                    rotation_deg = delta.rotation_angle().to_degrees(),
                    shift = delta.translation.norm(),
                    "refined plane alignment"
                );
                (delta, scored)
            }
            Err(error) => {
                warn!(%error, "refinement failed; keeping coarse alignment");
                confidence = Confidence::Reduced;
                let scored = matching
                    .pairs
                    .iter()
                    .map(|p| (p.source, p.target, p.score))
                    .collect();
                (RigidTransform::identity(), scored)
            }
        };
    let accumulated = refinement.compose(&coarse);

    // Stage 3: point-level polish.
    let moved: Vec<Point3<f64>> = source
        .points
        .iter()
        .map(|p| accumulated.transform_point(p))
        .collect();
    let icp_params = IcpParams {
        initial_transform: RigidTransform::identity(),
        ..params.icp
    };
    let polished = icp_align_indexed(&moved, target.points, target_index, &icp_params);
    let (icp_transform, icp) = match polished {
        Ok(result) => {
            if !result.converged {
                warn!(
                    iterations = result.iterations,
                    rms_error = result.rms_error,
                    "ICP stopped before converging"
                );
                confidence = Confidence::Reduced;
            }
            (result.transform, Some(result))
        }
        Err(error) => {
            warn!(%error, "ICP failed; keeping plane alignment");
            confidence = Confidence::Reduced;
            (RigidTransform::identity(), None)
        }
    };
    let transform = icp_transform.compose(&accumulated);

    let pairs: Vec<MatchedPair> = scored
        .into_iter()
        .map(|(s, t, score)| MatchedPair {
            source: s,
            target: t,
            score,
            residual_distance: (transform.transform_point(&source.patches[s].centroid())
                - target.patches[t].centroid())
            .norm(),
        })
        .collect();

    let registration = PlaneRegistration {
        transform,
        coarse,
        refinement,
        icp_transform,
        pairs,
        icp,
        confidence,
    };
    info!(
        pairs = registration.pairs.len(),
        mean_residual = registration.mean_residual_distance(),
        confidence = ?registration.confidence,
        "registration complete"
    );
    Ok(registration)
}

/// Re-matches every source patch after `coarse` and solves for the
/// remaining correction.
///
/// Returns the correction and the `(source, target, score)` pairs ordered
/// by source index.
fn refine(
    source: &[SegmentedPlane],
    target: &[SegmentedPlane],
    coarse: &RigidTransform,
    params: &RefineParams,
) -> RegistrationResult<(RigidTransform, Vec<(usize, usize, f64)>)> {
    let moved: Vec<Plane> = source.iter().map(|p| p.plane.transformed(coarse)).collect();

    let mut candidates: Vec<(f64, usize, usize)> = (0..source.len())
        .into_par_iter()
        .flat_map_iter(|s| {
            let plane = &moved[s];
            target.iter().enumerate().filter_map(move |(t, other)| {
                let angle = plane.angle_to(&other.plane);
                if angle > params.angle_tolerance {
                    return None;
                }
                let gap = other
                    .plane
                    .distance_to(&plane.centroid())
                    .max(plane.distance_to(&other.centroid()));
                if gap > params.plane_distance {
                    return None;
                }
                let reach = params.centroid_distance_factor * source[s].extent().max(other.extent());
                if (plane.centroid() - other.centroid()).norm() > reach {
                    return None;
                }
                let a = angle / params.angle_tolerance;
                let g = gap / params.plane_distance;
                Some((a.mul_add(a, g * g), s, t))
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut source_used = vec![false; source.len()];
    let mut target_used = vec![false; target.len()];
    let mut pairs = Vec::new();
    for (score, s, t) in candidates {
        if source_used[s] || target_used[t] {
            continue;
        }
        source_used[s] = true;
        target_used[t] = true;
        pairs.push((s, t, score));
    }
    if pairs.len() < MIN_PLANE_PAIRS {
        return Err(RegistrationError::InsufficientCorrespondences {
            found: pairs.len(),
            required: MIN_PLANE_PAIRS,
        });
    }
    pairs.sort_unstable_by_key(|&(s, t, _)| (s, t));

    let (src_obs, tgt_obs): (Vec<_>, Vec<_>) = pairs
        .iter()
        .map(|&(s, t, _)| {
            let plane = &moved[s];
            let n = target[t].normal();
            let oriented = if plane.normal().dot(&n) < 0.0 { -n } else { n };
            (
                PlaneObservation::new(plane.normal(), plane.centroid()),
                PlaneObservation::new(oriented, target[t].centroid()),
            )
        })
        .unzip();
    let delta = compute_plane_transform(&src_obs, &tgt_obs)?;
    Ok((delta, pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::{patches, room_scene, scene_truth};

    fn rotation_error_deg(a: &RigidTransform, b: &RigidTransform) -> f64 {
        a.inverse().compose(b).rotation_angle().to_degrees()
    }

    #[test]
    fn recovers_transform_of_identical_samples() {
        let (points, groups) = room_scene(11);
        let truth = scene_truth();
        let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        let (sp, tp) = (patches(&points, &groups), patches(&moved, &groups));

        let result = register_planes(
            &PlaneScene::new(&points, &sp),
            &PlaneScene::new(&moved, &tp),
            &RegistrationParams::default(),
        )
        .unwrap();

        assert!(rotation_error_deg(&result.transform, &truth) < 1e-4);
        assert!((result.transform.translation - truth.translation).norm() < 1e-6);
        assert_eq!(result.confidence, Confidence::Full);
        assert_eq!(result.pairs.len(), 4);
        assert!(result.mean_residual_distance() < 1e-6);
        assert!(result.icp.is_some());
    }

    #[test]
    fn stages_compose_in_order() {
        let (points, groups) = room_scene(12);
        let truth = scene_truth();
        let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        let (sp, tp) = (patches(&points, &groups), patches(&moved, &groups));

        let result = register_planes(
            &PlaneScene::new(&points, &sp),
            &PlaneScene::new(&moved, &tp),
            &RegistrationParams::default(),
        )
        .unwrap();

        let expected = result.icp_transform.compose(&result.plane_transform());
        assert!(rotation_error_deg(&result.transform, &expected) < 1e-9);
        assert!((result.transform.translation - expected.translation).norm() < 1e-9);
    }

    #[test]
    fn coarse_stage_is_exact_for_resampled_planes() {
        let (points, groups) = room_scene(13);
        let (other, other_groups) = room_scene(14);
        let truth = scene_truth();
        let moved: Vec<_> = other.iter().map(|p| truth.transform_point(p)).collect();
        let (sp, tp) = (patches(&points, &groups), patches(&moved, &other_groups));

        let result = register_planes(
            &PlaneScene::new(&points, &sp),
            &PlaneScene::new(&moved, &tp),
            &RegistrationParams::default(),
        )
        .unwrap();

        assert!(rotation_error_deg(&result.coarse, &truth) < 1e-6);
        assert!((result.coarse.translation - truth.translation).norm() < 1e-6);
        assert!(rotation_error_deg(&result.transform, &truth) < 1.0);
        assert!((result.transform.translation - truth.translation).norm() < 0.1);
    }

    #[test]
    fn missing_source_points_reduce_confidence() {
        let (points, groups) = room_scene(15);
        let truth = scene_truth();
        let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        let (sp, tp) = (patches(&points, &groups), patches(&moved, &groups));

        let result = register_planes(
            &PlaneScene::new(&[], &sp),
            &PlaneScene::new(&moved, &tp),
            &RegistrationParams::default(),
        )
        .unwrap();

        assert!(result.icp.is_none());
        assert_eq!(result.confidence, Confidence::Reduced);
        assert!(result.icp_transform.is_identity(1e-12));
        assert!(rotation_error_deg(&result.transform, &truth) < 1e-4);
    }

    #[test]
    fn capped_icp_reduces_confidence() {
        let (points, groups) = room_scene(19);
        let truth = scene_truth();
        let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        let (sp, tp) = (patches(&points, &groups), patches(&moved, &groups));

        // The patches keep their planes; only the points handed to ICP shift.
        let nudge = RigidTransform::from_translation(nalgebra::Vector3::new(0.03, -0.02, 0.04));
        let nudged: Vec<_> = points.iter().map(|p| nudge.transform_point(p)).collect();

        let params =
            RegistrationParams::default().with_icp(IcpParams::new().with_max_iterations(1));
        let result = register_planes(
            &PlaneScene::new(&nudged, &sp),
            &PlaneScene::new(&moved, &tp),
            &params,
        )
        .unwrap();

        assert!(result.refinement.is_identity(1e-6));
        let icp = result.icp.as_ref().unwrap();
        assert!(!icp.converged);
        assert_eq!(icp.iterations, 1);
        assert_eq!(result.confidence, Confidence::Reduced);
    }

    #[test]
    fn failed_refinement_keeps_coarse_transform() {
        let (points, groups) = room_scene(13);
        let (other, other_groups) = room_scene(14);
        let truth = scene_truth();
        let moved: Vec<_> = other.iter().map(|p| truth.transform_point(p)).collect();
        let (sp, tp) = (patches(&points, &groups), patches(&moved, &other_groups));

        // Resampled centroids never coincide this closely.
        let params = RegistrationParams::default()
            .with_refine(RefineParams::new().with_centroid_distance_factor(1e-9));
        let result = register_planes(
            &PlaneScene::new(&points, &sp),
            &PlaneScene::new(&moved, &tp),
            &params,
        )
        .unwrap();

        assert!(result.refinement.is_identity(1e-12));
        let plane = result.plane_transform();
        assert!(rotation_error_deg(&plane, &result.coarse) < 1e-6);
        assert!((plane.translation - result.coarse.translation).norm() < 1e-12);
        assert_eq!(result.confidence, Confidence::Reduced);
        assert_eq!(result.pairs.len(), 4);
        assert!(rotation_error_deg(&result.coarse, &truth) < 1e-6);
        assert!(rotation_error_deg(&result.transform, &truth) < 1.0);
    }

    #[test]
    fn two_planes_fail_correspondence() {
        let (points, groups) = room_scene(16);
        let truth = scene_truth();
        let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        let (sp, tp) = (patches(&points, &groups[..2]), patches(&moved, &groups[..2]));

        let err = register_planes(
            &PlaneScene::new(&points, &sp),
            &PlaneScene::new(&moved, &tp),
            &RegistrationParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::InsufficientCorrespondences { .. }));
    }

    #[test]
    fn empty_scenes_are_rejected() {
        let (points, groups) = room_scene(17);
        let sp = patches(&points, &groups);
        let params = RegistrationParams::default();

        let err = register_planes(
            &PlaneScene::new(&points, &sp),
            &PlaneScene::new(&[], &[]),
            &params,
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::EmptyTargetMesh));

        let moved: Vec<_> = points.iter().map(|p| scene_truth().transform_point(p)).collect();
        let index = KdNeighbors::new(&moved);
        let err = register_planes_indexed(
            &PlaneScene::new(&points, &[]),
            &PlaneScene::new(&moved, &sp),
            &index,
            &params,
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::EmptySourceMesh));
    }

    #[test]
    fn refinement_pairs_every_overlapping_patch() {
        let (points, groups) = room_scene(18);
        let truth = scene_truth();
        let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        let (sp, tp) = (patches(&points, &groups), patches(&moved, &groups));

        let (delta, pairs) = refine(&sp, &tp, &truth, &RefineParams::default()).unwrap();
        assert!(delta.is_identity(1e-6));
        let matched: Vec<_> = pairs.iter().map(|&(s, t, _)| (s, t)).collect();
        assert_eq!(matched, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }
}
