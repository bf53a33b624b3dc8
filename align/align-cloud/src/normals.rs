//! Normal and curvature estimation by local PCA.
//!
//! For each point the covariance of its neighborhood is decomposed; the
//! eigenvector of the smallest eigenvalue is the normal and
//! `lambda_min / (l0 + l1 + l2)` is the curvature (surface variation).
//! A flat neighborhood has curvature near 0, an isotropic one near 1/3.

use align_types::PointCloud;
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CloudError, CloudResult};
use crate::neighbors::{NeighborQuery, Neighborhood};

/// Curvature assigned to points whose neighborhood is too small to fit.
///
/// It is above any real surface variation, so such points never seed a patch.
pub const FALLBACK_CURVATURE: f64 = 1.0;

/// Parameters for normal estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalParams {
    /// Neighborhood used for the local fit. Default: 20 nearest points.
    pub neighborhood: Neighborhood,

    /// Optional viewpoint; normals are flipped to face it. Default: none.
    pub viewpoint: Option<Point3<f64>>,
}

impl Default for NormalParams {
    fn default() -> Self {
        Self {
            neighborhood: Neighborhood::Nearest(20),
            viewpoint: None,
        }
    }
}

impl NormalParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Small neighborhoods: quick, keeps sharp features, noisier normals.
    #[must_use]
    pub fn fast() -> Self {
        Self::default().with_neighborhood(Neighborhood::Nearest(10))
    }

    /// Large neighborhoods: smoother normals on noisy scans.
    #[must_use]
    pub fn high_quality() -> Self {
        Self::default().with_neighborhood(Neighborhood::Nearest(40))
    }

    /// Sets the neighborhood.
    #[must_use]
    pub const fn with_neighborhood(mut self, neighborhood: Neighborhood) -> Self {
        self.neighborhood = neighborhood;
        self
    }

    /// Sets the viewpoint that normals are oriented towards.
    #[must_use]
    pub const fn with_viewpoint(mut self, viewpoint: Point3<f64>) -> Self {
        self.viewpoint = Some(viewpoint);
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::InvalidParameter`] if fewer than 3 neighbors are
    /// requested or the radius is not a positive finite number.
    pub fn validate(&self) -> CloudResult<()> {
        match self.neighborhood {
            Neighborhood::Nearest(k) if k < 3 => Err(CloudError::InvalidParameter {
                reason: format!("neighborhood must contain at least 3 points, got k = {k}"),
            }),
            Neighborhood::Radius(r) if !(r.is_finite() && r > 0.0) => {
                Err(CloudError::InvalidParameter {
                    reason: format!("neighborhood radius must be positive, got {r}"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Normal and curvature of one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalSurface {
    /// Unit normal.
    pub normal: Vector3<f64>,
    /// Surface variation in `[0, 1/3]`, or [`FALLBACK_CURVATURE`].
    pub curvature: f64,
}

impl LocalSurface {
    const FALLBACK: Self = Self {
        normal: Vector3::new(0.0, 0.0, 1.0),
        curvature: FALLBACK_CURVATURE,
    };
}

/// Fits a local surface to the given positions.
///
/// Returns `None` for fewer than 3 positions or when all positions coincide.
#[must_use]
pub fn fit_local_surface(positions: &[Point3<f64>]) -> Option<LocalSurface> {
    if positions.len() < 3 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = positions.len() as f64;
    let mean: Vector3<f64> = positions.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n;

    let mut cov = Matrix3::zeros();
    for p in positions {
        let diff = p.coords - mean;
        cov += diff * diff.transpose();
    }

    let eigen = SymmetricEigen::new(cov);
    let eigenvalues = eigen.eigenvalues;
    let total = eigenvalues.iter().map(|l| l.max(0.0)).sum::<f64>();
    if total <= 0.0 {
        return None;
    }

    let min_idx = eigenvalues.imin();
    let normal = eigen.eigenvectors.column(min_idx).into_owned();
    let normal = normal.try_normalize(1e-12)?;

    Some(LocalSurface {
        normal,
        curvature: eigenvalues[min_idx].max(0.0) / total,
    })
}

/// Estimates a normal and curvature for every point of `cloud`.
///
/// `neighbors` must index the positions of `cloud` in order. Points whose
/// neighborhood holds fewer than 3 points get a +Z normal and
/// [`FALLBACK_CURVATURE`].
///
/// # Errors
///
/// Returns an error if the cloud is empty, has fewer than 3 points, the
/// index does not match the cloud, or the parameters are invalid.
///
/// # Example
///
/// ```
/// use align_cloud::{estimate_normals, KdNeighbors, NormalParams};
/// use align_types::PointCloud;
/// use nalgebra::Point3;
///
/// // A slightly tilted plane, jittered to keep the KD-tree buckets balanced.
/// let positions: Vec<_> = (0..400)
///     .map(|i| {
///         let (x, y) = (f64::from(i % 20) * 0.1, f64::from(i / 20) * 0.1);
///         Point3::new(x + f64::from(i) * 1e-5, y, 0.01 * x)
///     })
///     .collect();
/// let mut cloud = PointCloud::from_positions(&positions);
/// let index = KdNeighbors::new(&positions);
///
/// estimate_normals(&mut cloud, &index, &NormalParams::fast()).unwrap();
/// assert!(cloud.has_normals());
/// ```
pub fn estimate_normals(
    cloud: &mut PointCloud,
    neighbors: &impl NeighborQuery,
    params: &NormalParams,
) -> CloudResult<()> {
    if cloud.is_empty() {
        return Err(CloudError::EmptyPointCloud);
    }
    if cloud.len() < 3 {
        return Err(CloudError::InsufficientPoints {
            required: 3,
            actual: cloud.len(),
        });
    }
    if neighbors.len() != cloud.len() {
        return Err(CloudError::InvalidParameter {
            reason: format!(
                "neighbor index holds {} points but the cloud has {}",
                neighbors.len(),
                cloud.len()
            ),
        });
    }
    params.validate()?;

    let positions = cloud.positions();
    let surfaces: Vec<Option<LocalSurface>> = positions
        .par_iter()
        .map(|p| {
            let hood: Vec<Point3<f64>> = neighbors
                .neighbors(p, params.neighborhood)
                .into_iter()
                .map(|i| positions[i])
                .collect();
            fit_local_surface(&hood)
        })
        .collect();

    let mut fallback = 0usize;
    for ((point, surface), position) in cloud.points.iter_mut().zip(surfaces).zip(&positions) {
        let surface = surface.unwrap_or_else(|| {
            fallback += 1;
            LocalSurface::FALLBACK
        });
        let mut normal = surface.normal;
        if let Some(viewpoint) = params.viewpoint {
            if normal.dot(&(viewpoint - position)) < 0.0 {
                normal = -normal;
            }
        }
        point.normal = Some(normal);
        point.curvature = Some(surface.curvature);
    }

    if fallback > 0 {
        debug!(fallback, "points with too few neighbors for a local fit");
    }
    info!(points = cloud.len(), "estimated normals");

    Ok(())
}
