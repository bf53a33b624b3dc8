//! Least-squares rigid transforms from paired points and paired planes.
//!
//! Both solves share the same orthogonal Procrustes core: the rotation
//! maximizing `sum(w * (R a_i) . b_i)` is `V * U^T` from the SVD of
//! `H = sum(w * a_i * b_i^T)`, with the last column of `V` flipped when the
//! result would be a reflection.

use align_types::RigidTransform;
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};

use crate::error::{RegistrationError, RegistrationResult};

/// Relative singular value below which a direction counts as unconstrained.
const RANK_TOLERANCE: f64 = 1e-6;

/// Relative eigenvalue below which the normals do not pin translation along
/// an axis and the centroid difference is used instead.
const TRANSLATION_CONDITION: f64 = 1e-3;

/// An oriented plane used as a correspondence: unit normal plus a point on
/// the plane (the patch centroid).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneObservation {
    /// Unit normal.
    pub normal: Vector3<f64>,
    /// Point on the plane.
    pub centroid: Point3<f64>,
}

impl PlaneObservation {
    /// Creates an observation, normalizing the normal.
    #[must_use]
    pub fn new(normal: Vector3<f64>, centroid: Point3<f64>) -> Self {
        Self {
            normal: normal.normalize(),
            centroid,
        }
    }
}

/// Computes the optimal rigid transform that aligns source points to target points.
///
/// Uses the Kabsch algorithm (SVD-based) to find the rotation that minimizes
/// the root mean square deviation between the point sets.
///
/// # Errors
///
/// Returns an error if:
/// - Either point set is empty
/// - The point sets have different lengths
/// - SVD computation fails
///
/// # Example
///
/// ```
/// use align_registration::compute_rigid_transform;
/// use nalgebra::Point3;
///
/// let source = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
///
/// // Target is source translated by (1, 2, 3)
/// let target = vec![
///     Point3::new(1.0, 2.0, 3.0),
///     Point3::new(2.0, 2.0, 3.0),
///     Point3::new(1.0, 3.0, 3.0),
/// ];
///
/// let transform = compute_rigid_transform(&source, &target).unwrap();
/// let aligned = transform.transform_point(&source[0]);
/// assert!((aligned.coords - target[0].coords).norm() < 1e-6);
/// ```
pub fn compute_rigid_transform(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
) -> RegistrationResult<RigidTransform> {
    let weights = vec![1.0; source_points.len()];
    compute_weighted_rigid_transform(source_points, target_points, &weights)
}

/// Computes the optimal rigid transform using weighted point correspondences.
///
/// # Errors
///
/// Returns an error if:
/// - Either point set is empty
/// - The point sets or weights differ in length
/// - Total weight is zero or negative
/// - SVD computation fails
pub fn compute_weighted_rigid_transform(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    weights: &[f64],
) -> RegistrationResult<RigidTransform> {
    if source_points.is_empty() {
        return Err(RegistrationError::EmptySourceMesh);
    }
    if target_points.is_empty() {
        return Err(RegistrationError::EmptyTargetMesh);
    }
    if source_points.len() != target_points.len() || source_points.len() != weights.len() {
        return Err(RegistrationError::InvalidParameter(format!(
            "point sets and weights must have equal length: {} vs {} vs {}",
            source_points.len(),
            target_points.len(),
            weights.len()
        )));
    }

    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        return Err(RegistrationError::InvalidParameter(
            "total weight must be positive".to_string(),
        ));
    }

    let source_centroid = weighted_centroid(source_points, weights, total_weight);
    let target_centroid = weighted_centroid(target_points, weights, total_weight);

    let mut h = Matrix3::zeros();
    for ((s, t), &w) in source_points.iter().zip(target_points).zip(weights) {
        h += w * (s.coords - source_centroid) * (t.coords - target_centroid).transpose();
    }

    let rotation = optimal_rotation(&h)?;
    let translation = target_centroid - rotation * source_centroid;
    Ok(RigidTransform::from_rotation_matrix(&rotation, translation))
}

/// Computes the rigid transform that carries source planes onto their
/// matched target planes.
///
/// The rotation aligns the normals in the least-squares sense. The
/// translation then minimizes the squared distances of the rotated source
/// centroids to the target planes; along directions no normal constrains
/// (for instance the common axis of two planes) the mean centroid
/// difference is used.
///
/// Normals must already be consistently oriented between the two lists.
///
/// # Errors
///
/// Returns an error if the lists are empty or differ in length, or
/// [`RegistrationError::DegenerateNormals`] when all matched normals are
/// parallel, which leaves the rotation undetermined.
///
/// # Example
///
/// ```
/// use align_registration::{compute_plane_transform, PlaneObservation};
/// use nalgebra::{Point3, Vector3};
///
/// let source = [
///     PlaneObservation::new(Vector3::x(), Point3::new(0.0, 1.0, 1.0)),
///     PlaneObservation::new(Vector3::y(), Point3::new(1.0, 0.0, 1.0)),
///     PlaneObservation::new(Vector3::z(), Point3::new(1.0, 1.0, 0.0)),
/// ];
/// let shift = Vector3::new(2.0, -1.0, 0.5);
/// let target: Vec<_> = source
///     .iter()
///     .map(|p| PlaneObservation::new(p.normal, p.centroid + shift))
///     .collect();
///
/// let transform = compute_plane_transform(&source, &target).unwrap();
/// assert!((transform.translation - shift).norm() < 1e-9);
/// assert!(transform.rotation_angle() < 1e-9);
/// ```
pub fn compute_plane_transform(
    source: &[PlaneObservation],
    target: &[PlaneObservation],
) -> RegistrationResult<RigidTransform> {
    if source.is_empty() {
        return Err(RegistrationError::EmptySourceMesh);
    }
    if target.is_empty() {
        return Err(RegistrationError::EmptyTargetMesh);
    }
    if source.len() != target.len() {
        return Err(RegistrationError::InvalidParameter(format!(
            "plane lists must have equal length: {} vs {}",
            source.len(),
            target.len()
        )));
    }

    let h: Matrix3<f64> = source
        .iter()
        .zip(target)
        .map(|(s, t)| s.normal * t.normal.transpose())
        .sum();
    let rank = numerical_rank(&h);
    if rank < 2 {
        return Err(RegistrationError::DegenerateNormals { rank });
    }
    let rotation = optimal_rotation(&h)?;

    // Normal equations of sum((n_t . (R c_s + t - c_t))^2).
    let mut normal_matrix = Matrix3::zeros();
    let mut rhs = Vector3::zeros();
    let mut mean_offset = Vector3::zeros();
    for (s, t) in source.iter().zip(target) {
        let offset = t.centroid.coords - rotation * s.centroid.coords;
        let nn = t.normal * t.normal.transpose();
        normal_matrix += nn;
        rhs += nn * offset;
        mean_offset += offset;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = source.len() as f64;
    mean_offset /= count;

    let eigen = SymmetricEigen::new(normal_matrix);
    let largest = eigen.eigenvalues.amax();
    let mut translation = Vector3::zeros();
    for k in 0..3 {
        let axis = eigen.eigenvectors.column(k).into_owned();
        let lambda = eigen.eigenvalues[k];
        if largest > 0.0 && lambda > TRANSLATION_CONDITION * largest {
            translation += axis * (axis.dot(&rhs) / lambda);
        } else {
            translation += axis * axis.dot(&mean_offset);
        }
    }

    Ok(RigidTransform::from_rotation_matrix(&rotation, translation))
}

/// Proper rotation maximizing `trace(R * H)`.
fn optimal_rotation(h: &Matrix3<f64>) -> RegistrationResult<Matrix3<f64>> {
    let svd = h.svd(true, true);
    let u = svd.u.ok_or(RegistrationError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(RegistrationError::SvdFailed)?;

    let mut rotation = v_t.transpose() * u.transpose();

    // Handle reflection case (det(R) = -1): flip the column of V paired
    // with the smallest singular value.
    if rotation.determinant() < 0.0 {
        let smallest = svd.singular_values.imin();
        let mut v = v_t.transpose();
        for i in 0..3 {
            v[(i, smallest)] = -v[(i, smallest)];
        }
        rotation = v * u.transpose();
    }
    Ok(rotation)
}

fn numerical_rank(h: &Matrix3<f64>) -> usize {
    let sigma = h.singular_values();
    let largest = sigma.max();
    if largest <= 0.0 {
        return 0;
    }
    sigma.iter().filter(|&&s| s > RANK_TOLERANCE * largest).count()
}

fn weighted_centroid(points: &[Point3<f64>], weights: &[f64], total_weight: f64) -> Vector3<f64> {
    let weighted_sum: Vector3<f64> = points
        .iter()
        .zip(weights)
        .map(|(p, &w)| p.coords * w)
        .sum();
    weighted_sum / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use std::f64::consts::PI;

    fn make_tetrahedron() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.3, 0.3, 0.8),
        ]
    }

    fn box_corner_planes() -> Vec<PlaneObservation> {
        vec![
            PlaneObservation::new(Vector3::x(), Point3::new(0.0, 1.0, 1.5)),
            PlaneObservation::new(Vector3::y(), Point3::new(0.5, 0.0, 1.5)),
            PlaneObservation::new(Vector3::z(), Point3::new(0.5, 1.0, 0.0)),
        ]
    }

    fn moved(planes: &[PlaneObservation], t: &RigidTransform) -> Vec<PlaneObservation> {
        planes
            .iter()
            .map(|p| {
                PlaneObservation::new(t.transform_vector(&p.normal), t.transform_point(&p.centroid))
            })
            .collect()
    }

    #[test]
    fn test_pure_translation() {
        let source = make_tetrahedron();
        let translation = Vector3::new(5.0, 3.0, 2.0);
        let target: Vec<Point3<f64>> = source.iter().map(|p| p + translation).collect();

        let transform = compute_rigid_transform(&source, &target).unwrap();

        assert!(transform.rotation_angle() < 1e-6);
        assert_relative_eq!(transform.translation, translation, epsilon = 1e-6);
    }

    #[test]
    fn test_rotation_and_translation() {
        let source = make_tetrahedron();
        let truth = RigidTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.0),
            Vector3::new(10.0, 5.0, 0.0),
        );
        let target: Vec<Point3<f64>> = source.iter().map(|p| truth.transform_point(p)).collect();

        let transform = compute_rigid_transform(&source, &target).unwrap();

        for (s, t) in source.iter().zip(&target) {
            assert_relative_eq!(transform.transform_point(s), *t, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_weighted_different_weights() {
        let source = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)];
        let target = vec![Point3::new(1.0, 0.0, 0.0), Point3::new(100.0, 0.0, 0.0)];

        let transform =
            compute_weighted_rigid_transform(&source, &target, &[100.0, 0.01]).unwrap();

        assert!(transform.translation.x > 0.9 && transform.translation.x < 1.1);
    }

    #[test]
    fn test_input_validation() {
        let one = vec![Point3::new(1.0, 0.0, 0.0)];
        let two = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(matches!(
            compute_rigid_transform(&[], &one),
            Err(RegistrationError::EmptySourceMesh)
        ));
        assert!(matches!(
            compute_rigid_transform(&one, &[]),
            Err(RegistrationError::EmptyTargetMesh)
        ));
        assert!(matches!(
            compute_rigid_transform(&two, &one),
            Err(RegistrationError::InvalidParameter(_))
        ));
        assert!(matches!(
            compute_weighted_rigid_transform(&two, &two, &[0.0, 0.0]),
            Err(RegistrationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_reflection_handling() {
        let source = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        // Mirror across YZ plane
        let target = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];

        let transform = compute_rigid_transform(&source, &target).unwrap();
        let mat = transform.to_matrix4();
        assert!(mat.fixed_view::<3, 3>(0, 0).determinant() > 0.0);
    }

    #[test]
    fn plane_transform_recovers_rotation_and_translation() {
        let truth = RigidTransform::new(
            UnitQuaternion::from_euler_angles(0.3, -0.7, 1.9),
            Vector3::new(-4.0, 2.5, 10.0),
        );
        let source = box_corner_planes();
        let target = moved(&source, &truth);

        let transform = compute_plane_transform(&source, &target).unwrap();
        assert_relative_eq!(
            transform.rotation.angle_to(&truth.rotation),
            0.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(transform.translation, truth.translation, epsilon = 1e-9);
    }

    #[test]
    fn plane_transform_ignores_in_plane_centroid_shift() {
        // Target patches cover different parts of the same planes.
        let truth = RigidTransform::from_translation(Vector3::new(1.0, 2.0, 3.0));
        let source = box_corner_planes();
        let mut target = moved(&source, &truth);
        target[0].centroid += Vector3::new(0.0, 0.4, -0.2);
        target[2].centroid += Vector3::new(0.3, 0.3, 0.0);

        let transform = compute_plane_transform(&source, &target).unwrap();
        assert_relative_eq!(transform.translation, truth.translation, epsilon = 1e-9);
    }

    #[test]
    fn two_planes_fall_back_to_centroids_along_their_axis() {
        let truth = RigidTransform::from_translation(Vector3::new(0.5, -0.5, 2.0));
        let source = box_corner_planes()[..2].to_vec();
        let target = moved(&source, &truth);

        let transform = compute_plane_transform(&source, &target).unwrap();
        assert_relative_eq!(transform.translation, truth.translation, epsilon = 1e-9);
    }

    #[test]
    fn parallel_normals_are_degenerate() {
        let source = vec![
            PlaneObservation::new(Vector3::z(), Point3::new(0.0, 0.0, 0.0)),
            PlaneObservation::new(Vector3::z(), Point3::new(0.0, 0.0, 1.0)),
            PlaneObservation::new(Vector3::z(), Point3::new(0.0, 0.0, 2.0)),
        ];
        assert!(matches!(
            compute_plane_transform(&source, &source),
            Err(RegistrationError::DegenerateNormals { rank: 1 })
        ));
    }
}
