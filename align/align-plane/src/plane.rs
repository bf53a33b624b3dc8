//! Implicit plane model with least-squares fitting.

use align_types::RigidTransform;
use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PlaneError, PlaneResult};

/// Relative gap below which the two smallest singular values of a fit are
/// considered equal.
pub const SINGULAR_GAP_TOLERANCE: f64 = 1e-6;

/// A plane `a*x + b*y + c*z + d = 0` with a reference centroid.
///
/// `(a, b, c)` need not be unit length; every distance and normal query
/// normalizes them first. Planes from [`Plane::fit`] are stored normalized.
///
/// # Example
///
/// ```
/// use align_plane::Plane;
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 1.0),
///     Point3::new(1.0, 0.0, 1.0),
///     Point3::new(0.0, 1.0, 1.0),
///     Point3::new(1.0, 1.0, 1.0),
/// ];
/// let plane = Plane::fit(&points, &[0, 1, 2, 3]).unwrap();
///
/// assert!(plane.normal().z.abs() > 0.999);
/// assert!((plane.distance_to(&Point3::new(5.0, -2.0, 3.0)) - 2.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Plane {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    centroid: Point3<f64>,
}

impl Plane {
    /// Creates a plane through `point` with the given normal direction.
    ///
    /// Returns `None` if the normal has zero length.
    #[must_use]
    pub fn from_point_normal(point: Point3<f64>, normal: Vector3<f64>) -> Option<Self> {
        let n = normal.try_normalize(f64::EPSILON)?;
        Some(Self {
            a: n.x,
            b: n.y,
            c: n.z,
            d: -n.dot(&point.coords),
            centroid: point,
        })
    }

    /// Fits a plane to `points[i]` for every `i` in `indices`.
    ///
    /// The normal is the singular vector of the centered scatter matrix with
    /// the smallest singular value, and `d` places the centroid exactly on
    /// the plane. The sign of the normal is chosen so that its largest
    /// component is positive, which makes fits reproducible.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::DegeneratePlaneFit`] for fewer than 3 points,
    /// coincident or collinear points, or when the two smallest singular
    /// values cannot be told apart. Returns [`PlaneError::IndexOutOfBounds`]
    /// for an invalid index.
    pub fn fit(points: &[Point3<f64>], indices: &[usize]) -> PlaneResult<Self> {
        let count = indices.len();
        if count < 3 {
            return Err(PlaneError::DegeneratePlaneFit {
                points: count,
                reason: "fewer than 3 points".to_string(),
            });
        }
        if let Some(&index) = indices.iter().find(|&&i| i >= points.len()) {
            return Err(PlaneError::IndexOutOfBounds {
                index,
                len: points.len(),
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        let sum: Vector3<f64> = indices
            .par_iter()
            .map(|&i| points[i].coords)
            .reduce(Vector3::zeros, |a, b| a + b);
        let centroid = Point3::from(sum / n);

        let scatter: Matrix3<f64> = indices
            .par_iter()
            .map(|&i| {
                let diff = points[i] - centroid;
                diff * diff.transpose()
            })
            .reduce(Matrix3::zeros, |a, b| a + b);

        let svd = scatter.svd(true, false);
        let u = svd.u.ok_or_else(|| PlaneError::DegeneratePlaneFit {
            points: count,
            reason: "SVD did not converge".to_string(),
        })?;

        // Singular values of the scatter matrix are the squared singular
        // values of the centered coordinate matrix.
        let sigma = svd.singular_values.map(|s| s.max(0.0).sqrt());
        let mut order = [0usize, 1, 2];
        order.sort_by(|&i, &j| sigma[i].total_cmp(&sigma[j]));
        let (min_idx, mid_idx, max_idx) = (order[0], order[1], order[2]);

        if sigma[max_idx] <= 0.0 {
            return Err(PlaneError::DegeneratePlaneFit {
                points: count,
                reason: "all points coincide".to_string(),
            });
        }
        if sigma[mid_idx] - sigma[min_idx] <= SINGULAR_GAP_TOLERANCE * sigma[max_idx] {
            return Err(PlaneError::DegeneratePlaneFit {
                points: count,
                reason: "two smallest singular values are indistinguishable".to_string(),
            });
        }

        let mut normal = u.column(min_idx).into_owned();
        let dominant = normal.iamax();
        if normal[dominant] < 0.0 {
            normal = -normal;
        }

        Self::from_point_normal(centroid, normal).ok_or_else(|| PlaneError::DegeneratePlaneFit {
            points: count,
            reason: "zero-length normal".to_string(),
        })
    }

    /// The raw coefficients `[a, b, c, d]`.
    #[must_use]
    pub const fn coefficients(&self) -> [f64; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// Replaces the coefficients.
    ///
    /// # Errors
    ///
    /// Returns [`PlaneError::DegeneratePlaneFit`] if `(a, b, c)` is zero or
    /// not finite.
    pub fn set_coefficients(&mut self, a: f64, b: f64, c: f64, d: f64) -> PlaneResult<()> {
        let norm = Vector3::new(a, b, c).norm();
        if !(norm.is_finite() && norm > 0.0 && d.is_finite()) {
            return Err(PlaneError::DegeneratePlaneFit {
                points: 0,
                reason: format!("invalid coefficients ({a}, {b}, {c}, {d})"),
            });
        }
        self.a = a;
        self.b = b;
        self.c = c;
        self.d = d;
        Ok(())
    }

    /// The stored centroid.
    #[must_use]
    pub const fn centroid(&self) -> Point3<f64> {
        self.centroid
    }

    /// Replaces the stored centroid. The coefficients are left untouched.
    pub fn set_centroid(&mut self, centroid: Point3<f64>) {
        self.centroid = centroid;
    }

    /// Unit normal `(a, b, c) / |(a, b, c)|`.
    #[must_use]
    pub fn normal(&self) -> Vector3<f64> {
        let raw = Vector3::new(self.a, self.b, self.c);
        raw / raw.norm()
    }

    /// Offset of the normalized equation, `d / |(a, b, c)|`.
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.d / Vector3::new(self.a, self.b, self.c).norm()
    }

    /// Signed distance of `point`, positive on the side the normal faces.
    #[must_use]
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.normal().dot(&point.coords) + self.offset()
    }

    /// Absolute distance of `point` to the plane.
    #[must_use]
    pub fn distance_to(&self, point: &Point3<f64>) -> f64 {
        self.signed_distance(point).abs()
    }

    /// Orthogonal projection of `point` onto the plane.
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> Point3<f64> {
        point - self.normal() * self.signed_distance(point)
    }

    /// Population standard deviation of the distances of the indexed points.
    ///
    /// Returns 0 for an empty index set.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds for `points`.
    #[must_use]
    pub fn residual_std_dev(&self, points: &[Point3<f64>], indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = indices.len() as f64;

        let mean = indices
            .par_iter()
            .map(|&i| self.distance_to(&points[i]))
            .sum::<f64>()
            / n;

        let variance = indices
            .par_iter()
            .map(|&i| {
                let dev = self.distance_to(&points[i]) - mean;
                dev * dev
            })
            .sum::<f64>()
            / n;

        variance.sqrt()
    }

    /// Unsigned angle between the two normals, in `[0, pi/2]`.
    #[must_use]
    pub fn angle_to(&self, other: &Self) -> f64 {
        self.normal().dot(&other.normal()).abs().min(1.0).acos()
    }

    /// Returns the plane with its normal flipped (same point set).
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            a: -self.a,
            b: -self.b,
            c: -self.c,
            d: -self.d,
            centroid: self.centroid,
        }
    }

    /// The plane after moving space by `transform`.
    #[must_use]
    pub fn transformed(&self, transform: &RigidTransform) -> Self {
        let centroid = transform.transform_point(&self.centroid);
        let n = transform.transform_vector(&self.normal());
        Self {
            a: n.x,
            b: n.y,
            c: n.z,
            d: -n.dot(&centroid.coords),
            centroid,
        }
    }
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn make_noisy_plane(
        normal: Vector3<f64>,
        offset: Point3<f64>,
        n: usize,
        sigma: f64,
        seed: u64,
    ) -> Vec<Point3<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, sigma.max(f64::MIN_POSITIVE)).unwrap();
        let normal = normal.normalize();
        let u = normal
            .cross(&Vector3::x())
            .try_normalize(1e-6)
            .unwrap_or_else(|| normal.cross(&Vector3::y()).normalize());
        let v = normal.cross(&u);
        (0..n)
            .map(|_| {
                let s: f64 = rng.gen_range(-1.0..1.0);
                let t: f64 = rng.gen_range(-1.0..1.0);
                let e = if sigma > 0.0 { noise.sample(&mut rng) } else { 0.0 };
                offset + u * s + v * t + normal * e
            })
            .collect()
    }

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn exact_plane_has_zero_residual() {
        let normal = Vector3::new(1.0, 2.0, -0.5);
        let points = make_noisy_plane(normal, Point3::new(3.0, -1.0, 2.0), 200, 0.0, 1);
        let plane = Plane::fit(&points, &all(200)).unwrap();

        assert_relative_eq!(plane.normal().dot(&normal.normalize()).abs(), 1.0, epsilon = 1e-9);
        assert!(plane.residual_std_dev(&points, &all(200)) < 1e-9);
        for p in &points {
            assert!(plane.distance_to(p) < 1e-9);
        }
    }

    #[test]
    fn centroid_lies_on_plane() {
        let points = make_noisy_plane(Vector3::z(), Point3::new(0.0, 0.0, 4.0), 500, 0.01, 2);
        let plane = Plane::fit(&points, &all(500)).unwrap();
        assert!(plane.distance_to(&plane.centroid()) < 1e-12);
        assert_relative_eq!(plane.centroid().z, 4.0, epsilon = 0.01);
    }

    #[test]
    fn residual_std_dev_tracks_noise() {
        let points = make_noisy_plane(Vector3::y(), Point3::origin(), 5000, 0.01, 3);
        let plane = Plane::fit(&points, &all(5000)).unwrap();
        // Distances are |N(0, s)|, whose std dev is s * sqrt(1 - 2/pi).
        let expected = 0.01 * (1.0 - 2.0 / std::f64::consts::PI).sqrt();
        let std_dev = plane.residual_std_dev(&points, &all(5000));
        assert_relative_eq!(std_dev, expected, epsilon = 1e-3);
    }

    #[test]
    fn population_std_dev_of_known_distances() {
        let plane = Plane::from_point_normal(Point3::origin(), Vector3::z()).unwrap();
        let points = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, -3.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(4.0, 4.0, 0.0),
        ];
        // distances 1, 3, 0, 0 -> mean 1, variance (0 + 4 + 1 + 1) / 4
        assert_relative_eq!(plane.residual_std_dev(&points, &[0, 1, 2, 3]), 1.5_f64.sqrt());
        assert_relative_eq!(plane.residual_std_dev(&points, &[]), 0.0);
    }

    #[test]
    fn fit_rejects_degenerate_sets() {
        let line: Vec<_> = (0..10).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
        assert!(matches!(
            Plane::fit(&line, &all(10)),
            Err(PlaneError::DegeneratePlaneFit { .. })
        ));
        assert!(matches!(
            Plane::fit(&line, &[0, 1]),
            Err(PlaneError::DegeneratePlaneFit { points: 2, .. })
        ));

        let same = vec![Point3::new(1.0, 1.0, 1.0); 5];
        assert!(Plane::fit(&same, &all(5)).is_err());

        assert!(matches!(
            Plane::fit(&line, &[0, 1, 42]),
            Err(PlaneError::IndexOutOfBounds { index: 42, len: 10 })
        ));
    }

    #[test]
    fn isotropic_blob_is_ill_conditioned() {
        // Vertices of a regular octahedron: all three singular values equal.
        let points = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ];
        assert!(Plane::fit(&points, &all(6)).is_err());
    }

    #[test]
    fn distance_normalizes_coefficients() {
        let mut plane = Plane::from_point_normal(Point3::origin(), Vector3::z()).unwrap();
        plane.set_coefficients(0.0, 0.0, 10.0, -20.0).unwrap();
        assert_relative_eq!(plane.normal().norm(), 1.0);
        assert_relative_eq!(plane.distance_to(&Point3::new(7.0, 1.0, 5.0)), 3.0);
        assert_relative_eq!(plane.signed_distance(&Point3::new(0.0, 0.0, 1.0)), -1.0);
        assert!(plane.set_coefficients(0.0, 0.0, 0.0, 1.0).is_err());
        assert_eq!(plane.coefficients(), [0.0, 0.0, 10.0, -20.0]);
    }

    #[test]
    fn fit_orientation_is_canonical() {
        let points = make_noisy_plane(-Vector3::z(), Point3::origin(), 100, 0.0, 4);
        let plane = Plane::fit(&points, &all(100)).unwrap();
        assert!(plane.normal().z > 0.0);
        assert!(plane.flipped().normal().z < 0.0);
    }

    #[test]
    fn angle_is_unsigned() {
        let p = Plane::from_point_normal(Point3::origin(), Vector3::z()).unwrap();
        let q = Plane::from_point_normal(Point3::origin(), Vector3::new(0.0, 1.0, -1.0)).unwrap();
        assert_relative_eq!(p.angle_to(&q), std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
        assert_relative_eq!(p.angle_to(&p.flipped()), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn transformed_plane_contains_transformed_points() {
        let normal = Vector3::new(0.3, -0.2, 1.0);
        let points = make_noisy_plane(normal, Point3::new(1.0, 2.0, 3.0), 50, 0.0, 5);
        let plane = Plane::fit(&points, &all(50)).unwrap();
        let t = RigidTransform::new(
            UnitQuaternion::from_euler_angles(0.4, -1.0, 0.25),
            Vector3::new(-3.0, 0.5, 8.0),
        );
        let moved = plane.transformed(&t);
        for p in &points {
            assert!(moved.distance_to(&t.transform_point(p)) < 1e-9);
        }
        let projected = plane.project(&Point3::new(9.0, 9.0, 9.0));
        assert!(plane.distance_to(&projected) < 1e-9);
    }
}
