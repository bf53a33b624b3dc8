//! Rigid-invariant plane correspondence search.
//!
//! Plane pairs are compared through quantities a rigid motion preserves:
//! the unsigned angle between two planes and the distance between their
//! centroids. The search works in three steps:
//!
//! 1. Seed: every well-conditioned triple of the largest source patches is
//!    tried against every ordered triple of the largest target patches.
//! 2. Expand: each consistent seed greedily takes on further source
//!    patches, each paired with the target patch that is consistent with
//!    every pair so far and has the lowest discrepancy.
//! 3. Select: hypotheses are ranked by pair count, then mean discrepancy,
//!    then lexicographically by their pair lists.
//!
//! Discrepancies are `(d_angle / angle_tol)^2 + (d_dist / dist_tol)^2`,
//! summed over every pair of pairs.

use std::cmp::Ordering;

use align_plane::SegmentedPlane;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, RegistrationResult};
use crate::kabsch::PlaneObservation;
use crate::params::MatchParams;

/// Smallest `|det|` of three unit normals usable to fix a normal sign by
/// handedness.
const HANDEDNESS_FLOOR: f64 = 0.1;

/// One matched plane pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaneMatch {
    /// Index into the source patch list.
    pub source: usize,
    /// Index into the target patch list.
    pub target: usize,
    /// Mean discrepancy against the other pairs of the match.
    pub score: f64,
    /// True when the target normal must be negated to agree with the
    /// source normal.
    pub flip_target: bool,
}

/// The selected correspondence between two patch sets.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Matching {
    /// Matched pairs, ordered by source index.
    pub pairs: Vec<PlaneMatch>,
    /// Mean discrepancy over all pairs of pairs.
    pub mean_score: f64,
    /// Number of hypotheses evaluated.
    pub hypotheses: usize,
}

impl Matching {
    /// Oriented source and target planes of the matched pairs, ready for
    /// [`compute_plane_transform`](crate::compute_plane_transform).
    #[must_use]
    pub fn observations(
        &self,
        source: &[SegmentedPlane],
        target: &[SegmentedPlane],
    ) -> (Vec<PlaneObservation>, Vec<PlaneObservation>) {
        self.pairs
            .iter()
            .filter_map(|pair| {
                let s = source.get(pair.source)?;
                let t = target.get(pair.target)?;
                let sign = if pair.flip_target { -1.0 } else { 1.0 };
                Some((
                    PlaneObservation::new(s.normal(), s.centroid()),
                    PlaneObservation::new(t.normal() * sign, t.centroid()),
                ))
            })
            .unzip()
    }
}

#[derive(Debug, Clone, Copy)]
struct Facet {
    normal: Vector3<f64>,
    centroid: Point3<f64>,
}

impl Facet {
    fn angle_to(&self, other: &Self) -> f64 {
        self.normal.dot(&other.normal).abs().min(1.0).acos()
    }

    fn distance_to(&self, other: &Self) -> f64 {
        (self.centroid - other.centroid).norm()
    }
}

#[derive(Debug, Clone)]
struct Hypothesis {
    pairs: Vec<(usize, usize)>,
    total: f64,
    terms: usize,
}

impl Hypothesis {
    #[allow(clippy::cast_precision_loss)]
    fn mean(&self) -> f64 {
        if self.terms == 0 {
            0.0
        } else {
            self.total / self.terms as f64
        }
    }
}

fn rank(a: &Hypothesis, b: &Hypothesis) -> Ordering {
    b.pairs
        .len()
        .cmp(&a.pairs.len())
        .then_with(|| a.mean().total_cmp(&b.mean()))
        .then_with(|| a.pairs.cmp(&b.pairs))
}

/// Finds plane correspondences between two patch sets.
#[derive(Debug, Clone, Copy)]
pub struct PlaneMatcher {
    params: MatchParams,
}

impl PlaneMatcher {
    /// Creates a matcher.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidParameter`] for invalid parameters.
    pub fn new(params: MatchParams) -> RegistrationResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The parameters in use.
    #[must_use]
    pub const fn params(&self) -> &MatchParams {
        &self.params
    }

    /// Searches for the best correspondence.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InsufficientCorrespondences`] when no
    /// hypothesis reaches `min_pairs` pairs, which includes scenes with
    /// fewer than three non-parallel planes.
    pub fn find(
        &self,
        source: &[SegmentedPlane],
        target: &[SegmentedPlane],
    ) -> RegistrationResult<Matching> {
        let src = facets(source);
        let tgt = facets(target);
        let src_ids = largest(source, self.params.max_patches);
        let tgt_ids = largest(target, self.params.max_patches);

        let mut triples = Vec::new();
        for x in 0..src_ids.len() {
            for y in x + 1..src_ids.len() {
                for z in y + 1..src_ids.len() {
                    let triple = [src_ids[x], src_ids[y], src_ids[z]];
                    if self.well_conditioned(&src, triple) {
                        triples.push(triple);
                    }
                }
            }
        }

        let hypotheses: Vec<Hypothesis> = triples
            .par_iter()
            .flat_map_iter(|&triple| self.seeds(&src, &tgt, triple, &tgt_ids))
            .map(|seed| self.expand(seed, &src, &tgt, &src_ids, &tgt_ids))
            .collect();
        let evaluated = hypotheses.len();
        debug!(
            triples = triples.len(),
            hypotheses = evaluated,
            "correspondence hypotheses evaluated"
        );

        let Some(best) = hypotheses.into_iter().min_by(rank) else {
            let found = self.partial_support(&src, &tgt, &src_ids, &tgt_ids);
            return Err(RegistrationError::InsufficientCorrespondences {
                found,
                required: self.params.min_pairs,
            });
        };
        if best.pairs.len() < self.params.min_pairs {
            return Err(RegistrationError::InsufficientCorrespondences {
                found: best.pairs.len(),
                required: self.params.min_pairs,
            });
        }

        let flips = self.resolve_signs(&best.pairs, &src, &tgt);
        let pairs: Vec<PlaneMatch> = best
            .pairs
            .iter()
            .zip(&flips)
            .map(|(&(s, t), &flip_target)| PlaneMatch {
                source: s,
                target: t,
                score: self.pair_score(&best.pairs, (s, t), &src, &tgt),
                flip_target,
            })
            .collect();

        info!(
            source_patches = source.len(),
            target_patches = target.len(),
            hypotheses = evaluated,
            pairs = pairs.len(),
            mean_score = best.mean(),
            "plane correspondences selected"
        );

        Ok(Matching {
            pairs,
            mean_score: best.mean(),
            hypotheses: evaluated,
        })
    }

    /// Discrepancy between the source pair `(p.0, q.0)` and the target pair
    /// `(p.1, q.1)`, or `None` when they are inconsistent.
    fn term(
        &self,
        src: &[Facet],
        tgt: &[Facet],
        p: (usize, usize),
        q: (usize, usize),
    ) -> Option<f64> {
        let (sp, sq, tp, tq) = (&src[p.0], &src[q.0], &tgt[p.1], &tgt[q.1]);
        let d_angle = (sp.angle_to(sq) - tp.angle_to(tq)).abs();
        let (ds, dt) = (sp.distance_to(sq), tp.distance_to(tq));
        let d_dist = (ds - dt).abs();
        let dist_tol = self.params.distance_tolerance_for(ds, dt);
        if d_angle > self.params.angle_tolerance || d_dist > dist_tol {
            return None;
        }
        let a = d_angle / self.params.angle_tolerance;
        let d = d_dist / dist_tol;
        Some(a.mul_add(a, d * d))
    }

    fn well_conditioned(&self, src: &[Facet], [i, j, k]: [usize; 3]) -> bool {
        let min = self.params.min_triple_angle;
        src[i].angle_to(&src[j]) >= min
            && src[i].angle_to(&src[k]) >= min
            && src[j].angle_to(&src[k]) >= min
    }

    fn seeds(
        &self,
        src: &[Facet],
        tgt: &[Facet],
        [i, j, k]: [usize; 3],
        tgt_ids: &[usize],
    ) -> Vec<Hypothesis> {
        let mut seeds = Vec::new();
        for &a in tgt_ids {
            for &b in tgt_ids {
                if b == a {
                    continue;
                }
                let Some(ab) = self.term(src, tgt, (i, a), (j, b)) else {
                    continue;
                };
                for &c in tgt_ids {
                    if c == a || c == b {
                        continue;
                    }
                    let (Some(ac), Some(bc)) = (
                        self.term(src, tgt, (i, a), (k, c)),
                        self.term(src, tgt, (j, b), (k, c)),
                    ) else {
                        continue;
                    };
                    seeds.push(Hypothesis {
                        pairs: vec![(i, a), (j, b), (k, c)],
                        total: ab + ac + bc,
                        terms: 3,
                    });
                }
            }
        }
        seeds
    }

    fn expand(
        &self,
        mut hypothesis: Hypothesis,
        src: &[Facet],
        tgt: &[Facet],
        src_ids: &[usize],
        tgt_ids: &[usize],
    ) -> Hypothesis {
        for &s in src_ids {
            if hypothesis.pairs.iter().any(|&(ps, _)| ps == s) {
                continue;
            }
            let mut best: Option<(f64, usize)> = None;
            for &t in tgt_ids {
                if hypothesis.pairs.iter().any(|&(_, pt)| pt == t) {
                    continue;
                }
                let sum: Option<f64> = hypothesis
                    .pairs
                    .iter()
                    .map(|&p| self.term(src, tgt, p, (s, t)))
                    .sum();
                if let Some(sum) = sum {
                    if best.is_none_or(|(b, _)| sum < b) {
                        best = Some((sum, t));
                    }
                }
            }
            if let Some((sum, t)) = best {
                hypothesis.total += sum;
                hypothesis.terms += hypothesis.pairs.len();
                hypothesis.pairs.push((s, t));
            }
        }
        hypothesis.pairs.sort_unstable();
        hypothesis
    }

    fn pair_score(
        &self,
        pairs: &[(usize, usize)],
        pair: (usize, usize),
        src: &[Facet],
        tgt: &[Facet],
    ) -> f64 {
        let terms: Vec<f64> = pairs
            .iter()
            .filter(|&&q| q != pair)
            .filter_map(|&q| self.term(src, tgt, pair, q))
            .collect();
        if terms.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = terms.len() as f64;
        terms.iter().sum::<f64>() / n
    }

    /// Chooses, per pair, whether the target normal must be negated.
    ///
    /// The signed offset of every other centroid along a plane's normal is
    /// rigid-invariant up to that normal's sign, so comparing the offset
    /// patterns in source and target fixes the sign. Pairs whose plane has
    /// every other centroid on it are settled by matching the handedness
    /// of a normal triple instead.
    fn resolve_signs(&self, pairs: &[(usize, usize)], src: &[Facet], tgt: &[Facet]) -> Vec<bool> {
        let floor = self.params.distance_tolerance * self.params.distance_tolerance;
        let mut flips: Vec<Option<bool>> = pairs
            .iter()
            .map(|&(s, t)| {
                let agreement: f64 = pairs
                    .iter()
                    .filter(|&&(s2, _)| s2 != s)
                    .map(|&(s2, t2)| {
                        let a = src[s].normal.dot(&(src[s2].centroid - src[s].centroid));
                        let b = tgt[t].normal.dot(&(tgt[t2].centroid - tgt[t].centroid));
                        a * b
                    })
                    .sum();
                (agreement.abs() > floor).then_some(agreement < 0.0)
            })
            .collect();

        let oriented = |idx: usize, flip: bool| {
            let n = tgt[pairs[idx].1].normal;
            if flip { -n } else { n }
        };

        for p in 0..pairs.len() {
            if flips[p].is_some() {
                continue;
            }
            let mut best: Option<(f64, usize, usize)> = None;
            for q in 0..pairs.len() {
                for r in q + 1..pairs.len() {
                    if q == p || r == p || flips[q].is_none() || flips[r].is_none() {
                        continue;
                    }
                    let det = src[pairs[p].0]
                        .normal
                        .dot(&src[pairs[q].0].normal.cross(&src[pairs[r].0].normal));
                    if best.is_none_or(|(b, _, _)| det.abs() > b) {
                        best = Some((det.abs(), q, r));
                    }
                }
            }
            if let Some((magnitude, q, r)) = best {
                if magnitude >= HANDEDNESS_FLOOR {
                    let (fq, fr) = (flips[q].unwrap_or(false), flips[r].unwrap_or(false));
                    let det_s = src[pairs[p].0]
                        .normal
                        .dot(&src[pairs[q].0].normal.cross(&src[pairs[r].0].normal));
                    let det_t = tgt[pairs[p].1]
                        .normal
                        .dot(&oriented(q, fq).cross(&oriented(r, fr)));
                    flips[p] = Some(det_s * det_t < 0.0);
                }
            }
        }

        flips.into_iter().map(|f| f.unwrap_or(false)).collect()
    }

    /// Size of the best partial support when no triple is consistent.
    fn partial_support(
        &self,
        src: &[Facet],
        tgt: &[Facet],
        src_ids: &[usize],
        tgt_ids: &[usize],
    ) -> usize {
        for (x, &i) in src_ids.iter().enumerate() {
            for &j in &src_ids[x + 1..] {
                for &a in tgt_ids {
                    for &b in tgt_ids {
                        if a != b && self.term(src, tgt, (i, a), (j, b)).is_some() {
                            return 2;
                        }
                    }
                }
            }
        }
        usize::from(!src_ids.is_empty() && !tgt_ids.is_empty())
    }
}

fn facets(patches: &[SegmentedPlane]) -> Vec<Facet> {
    patches
        .iter()
        .map(|p| Facet {
            normal: p.normal(),
            centroid: p.centroid(),
        })
        .collect()
}

/// Indices of the `cap` largest patches, largest first, ties by index.
fn largest(patches: &[SegmentedPlane], cap: usize) -> Vec<usize> {
    let mut ids: Vec<usize> = (0..patches.len()).collect();
    ids.sort_by(|&a, &b| patches[b].len().cmp(&patches[a].len()).then(a.cmp(&b)));
    ids.truncate(cap);
    ids
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use align_types::RigidTransform;
    use nalgebra::UnitQuaternion;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Jittered grid of `nu * nv` points on the rectangle
    /// `origin + s * u + t * v`.
    fn rectangle(
        points: &mut Vec<Point3<f64>>,
        origin: Point3<f64>,
        (u, su): (Vector3<f64>, f64),
        (v, sv): (Vector3<f64>, f64),
        (nu, nv): (u32, u32),
        rng: &mut StdRng,
    ) -> Vec<usize> {
        let start = points.len();
        let (du, dv) = (su / f64::from(nu), sv / f64::from(nv));
        for i in 0..nu {
            for j in 0..nv {
                let s = du * (f64::from(i) + rng.gen_range(0.0..1.0));
                let t = dv * (f64::from(j) + rng.gen_range(0.0..1.0));
                points.push(origin + u * s + v * t);
            }
        }
        (start..points.len()).collect()
    }

    /// A floor, two walls of different sizes and a ramp.
    pub(crate) fn room_scene(seed: u64) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut points = Vec::new();
        let o = Point3::origin();
        let (x, y, z) = (Vector3::x(), Vector3::y(), Vector3::z());
        let ramp_dir = Vector3::new(0.0, 0.6, 0.8);
        let groups = vec![
            rectangle(&mut points, o, (x, 4.0), (y, 2.0), (20, 20), &mut rng),
            rectangle(&mut points, o, (x, 4.0), (z, 3.0), (25, 20), &mut rng),
            rectangle(&mut points, o, (y, 2.0), (z, 1.0), (20, 10), &mut rng),
            rectangle(
                &mut points,
                Point3::new(1.0, 2.0, 0.0),
                (x, 2.0),
                (ramp_dir, 1.0),
                (15, 10),
                &mut rng,
            ),
        ];
        (points, groups)
    }

    pub(crate) fn patches(points: &[Point3<f64>], groups: &[Vec<usize>]) -> Vec<SegmentedPlane> {
        groups
            .iter()
            .map(|g| SegmentedPlane::from_indices(points, g.clone()).unwrap())
            .collect()
    }

    pub(crate) fn scene_truth() -> RigidTransform {
        RigidTransform::new(
            UnitQuaternion::from_euler_angles(0.4, -0.3, 1.2),
            Vector3::new(3.0, -2.0, 1.0),
        )
    }

    fn matcher() -> PlaneMatcher {
        PlaneMatcher::new(MatchParams::default()).unwrap()
    }

    #[test]
    fn finds_all_pairs_under_rigid_motion() {
        let (points, groups) = room_scene(1);
        let source = patches(&points, &groups);

        let truth = scene_truth();
        let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        // Target lists the patches as ramp, short wall, floor, tall wall.
        let reordered = [3, 2, 0, 1].map(|g| groups[g].clone());
        let target = patches(&moved, &reordered);

        let matching = matcher().find(&source, &target).unwrap();
        let pairs: Vec<_> = matching.pairs.iter().map(|p| (p.source, p.target)).collect();
        assert_eq!(pairs, vec![(0, 2), (1, 3), (2, 1), (3, 0)]);
        assert!(matching.mean_score < 1e-6);
        assert!(matching.hypotheses > 0);
    }

    #[test]
    fn oriented_normals_agree_after_rotation() {
        let (points, groups) = room_scene(2);
        let source = patches(&points, &groups);
        let truth = scene_truth();
        let moved: Vec<_> = points.iter().map(|p| truth.transform_point(p)).collect();
        let target = patches(&moved, &groups);

        let matching = matcher().find(&source, &target).unwrap();
        let (src_obs, tgt_obs) = matching.observations(&source, &target);
        assert_eq!(src_obs.len(), 4);
        for (s, t) in src_obs.iter().zip(&tgt_obs) {
            assert!(truth.transform_vector(&s.normal).dot(&t.normal) > 0.999);
        }
    }

    #[test]
    fn two_planes_are_insufficient() {
        let (points, groups) = room_scene(3);
        let source = patches(&points, &groups[..2]);
        let target = source.clone();

        let err = matcher().find(&source, &target).unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::InsufficientCorrespondences { found: 2, required: 3 }
        ));
    }

    #[test]
    fn parallel_planes_are_insufficient() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut points = Vec::new();
        let groups: Vec<_> = [0.0, 1.0, 3.0]
            .into_iter()
            .map(|z| {
                rectangle(
                    &mut points,
                    Point3::new(0.0, 0.0, z),
                    (Vector3::x(), 2.0),
                    (Vector3::y(), 2.0),
                    (10, 10),
                    &mut rng,
                )
            })
            .collect();
        let source = patches(&points, &groups);

        let err = matcher().find(&source, &source).unwrap_err();
        assert!(matches!(err, RegistrationError::InsufficientCorrespondences { .. }));
    }

    #[test]
    fn empty_sets_are_insufficient() {
        let err = matcher().find(&[], &[]).unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::InsufficientCorrespondences { found: 0, .. }
        ));
    }

    #[test]
    fn sampling_cap_keeps_largest_patches() {
        let (points, groups) = room_scene(5);
        let source = patches(&points, &groups);
        assert_eq!(largest(&source, 3), vec![1, 0, 2]);
        assert_eq!(largest(&source, 10), vec![1, 0, 2, 3]);
    }
}
