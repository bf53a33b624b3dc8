//! Synthetic scenes with known geometry.

use align_types::{CloudPoint, PointCloud};
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Parameters for [`box_corner`].
///
/// Face `a` lies in the plane `c[a] = 0` and spans `face_sizes[a].0` along
/// axis `(a + 1) % 3` and `face_sizes[a].1` along axis `(a + 2) % 3`.
/// Faces of different sizes keep the corner free of symmetries that would
/// make the alignment ambiguous.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoxCornerParams {
    /// Samples drawn per face, outliers included. Default: 10 000.
    pub points_per_face: usize,

    /// Extents of the three faces. Default: `[(1, 2), (2, 3), (3, 1)]`.
    pub face_sizes: [(f64, f64); 3],

    /// Gaussian noise along each face normal. Default: 0.001.
    pub noise_std_dev: f64,

    /// Fraction of samples on a face; the rest are uniform in the bounding
    /// box. Default: 0.95.
    pub inlier_ratio: f64,

    /// Random seed. Default: 42.
    pub seed: u64,
}

impl Default for BoxCornerParams {
    fn default() -> Self {
        Self {
            points_per_face: 10_000,
            face_sizes: [(1.0, 2.0), (2.0, 3.0), (3.0, 1.0)],
            noise_std_dev: 0.001,
            inlier_ratio: 0.95,
            seed: 42,
        }
    }
}

impl BoxCornerParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of samples per face.
    #[must_use]
    pub const fn with_points_per_face(mut self, n: usize) -> Self {
        self.points_per_face = n;
        self
    }

    /// Sets the noise standard deviation.
    #[must_use]
    pub const fn with_noise_std_dev(mut self, std_dev: f64) -> Self {
        self.noise_std_dev = std_dev;
        self
    }

    /// Sets the inlier ratio.
    #[must_use]
    pub const fn with_inlier_ratio(mut self, ratio: f64) -> Self {
        self.inlier_ratio = ratio;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Extent of the bounding box along each axis.
    #[must_use]
    pub fn extent(&self) -> [f64; 3] {
        std::array::from_fn(|axis| {
            let as_u = self.face_sizes[(axis + 2) % 3].0;
            let as_v = self.face_sizes[(axis + 1) % 3].1;
            as_u.max(as_v)
        })
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for out-of-range values.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.points_per_face == 0 {
            return Err(PipelineError::Configuration(
                "points_per_face must be at least 1".to_string(),
            ));
        }
        if self
            .face_sizes
            .iter()
            .any(|&(u, v)| !(u.is_finite() && v.is_finite() && u > 0.0 && v > 0.0))
        {
            return Err(PipelineError::Configuration(
                "face sizes must be positive".to_string(),
            ));
        }
        if !(self.noise_std_dev.is_finite() && self.noise_std_dev >= 0.0) {
            return Err(PipelineError::Configuration(format!(
                "noise_std_dev must be non-negative, got {}",
                self.noise_std_dev
            )));
        }
        if !(self.inlier_ratio > 0.0 && self.inlier_ratio <= 1.0) {
            return Err(PipelineError::Configuration(format!(
                "inlier_ratio must be in (0, 1], got {}",
                self.inlier_ratio
            )));
        }
        Ok(())
    }
}

/// Samples three mutually orthogonal faces meeting at the origin.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] if the parameters are invalid.
///
/// # Example
///
/// ```
/// use align_pipeline::{BoxCornerParams, box_corner};
///
/// let cloud = box_corner(&BoxCornerParams::new().with_points_per_face(100)).unwrap();
/// assert_eq!(cloud.len(), 300);
/// ```
pub fn box_corner(params: &BoxCornerParams) -> PipelineResult<PointCloud> {
    params.validate()?;
    let noise = Normal::new(0.0, params.noise_std_dev)
        .map_err(|e| PipelineError::Configuration(e.to_string()))?;
    let extent = params.extent();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut cloud = PointCloud::new();

    for (axis, &(size_u, size_v)) in params.face_sizes.iter().enumerate() {
        for _ in 0..params.points_per_face {
            let mut c = [0.0; 3];
            if rng.r#gen::<f64>() < params.inlier_ratio {
                c[axis] = noise.sample(&mut rng);
                c[(axis + 1) % 3] = rng.gen_range(0.0..size_u);
                c[(axis + 2) % 3] = rng.gen_range(0.0..size_v);
            } else {
                for (k, value) in c.iter_mut().enumerate() {
                    *value = rng.gen_range(0.0..extent[k]);
                }
            }
            cloud.push(CloudPoint::new(Point3::new(c[0], c[1], c[2])));
        }
    }
    Ok(cloud)
}
