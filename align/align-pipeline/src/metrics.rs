//! Random ground-truth transforms and alignment error metrics.
//!
//! A ground truth `G` is the transform that moved a source away from the
//! target frame. A perfect estimate `T` undoes it, so `T ∘ G` is the
//! identity and its rotation angle and translation measure the error.

use align_types::RigidTransform;
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use rand::Rng;
use rand_distr::StandardNormal;

/// A rotation drawn uniformly from SO(3).
///
/// Q of the QR decomposition of a Gaussian matrix, with column signs fixed
/// by R's diagonal and the determinant forced to +1.
pub fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> UnitQuaternion<f64> {
    let m = Matrix3::from_fn(|_, _| rng.sample::<f64, _>(StandardNormal));
    let qr = m.qr();
    let r = qr.r();
    let mut q = qr.q();
    for i in 0..3 {
        if r[(i, i)] < 0.0 {
            q.column_mut(i).neg_mut();
        }
    }
    if q.determinant() < 0.0 {
        q.column_mut(0).neg_mut();
    }
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(q))
}

/// A translation with each component uniform in `[-max, max]`.
pub fn random_translation<R: Rng + ?Sized>(rng: &mut R, max: f64) -> Vector3<f64> {
    let max = max.abs();
    Vector3::from_fn(|_, _| rng.gen_range(-max..=max))
}

/// A random rotation followed by a random translation.
pub fn random_transform<R: Rng + ?Sized>(rng: &mut R, max_translation: f64) -> RigidTransform {
    let rotation = random_rotation(rng);
    RigidTransform::new(rotation, random_translation(rng, max_translation))
}

/// Angle in degrees of the residual rotation `estimate ∘ ground_truth`.
///
/// # Example
///
/// ```
/// use align_pipeline::rotation_error_deg;
/// use align_types::{RigidTransform, UnitQuaternion};
///
/// let truth = RigidTransform::from_rotation(UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3));
/// let estimate = RigidTransform::from_rotation(UnitQuaternion::from_euler_angles(0.0, 0.0, -0.29));
/// assert!((rotation_error_deg(&estimate, &truth) - 0.01_f64.to_degrees()).abs() < 1e-9);
/// ```
#[must_use]
pub fn rotation_error_deg(estimate: &RigidTransform, ground_truth: &RigidTransform) -> f64 {
    estimate.compose(ground_truth).rotation_angle().to_degrees()
}

/// Length of the residual translation of `estimate ∘ ground_truth`.
#[must_use]
pub fn translation_error(estimate: &RigidTransform, ground_truth: &RigidTransform) -> f64 {
    estimate.compose(ground_truth).translation.norm()
}
