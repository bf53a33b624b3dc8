//! Segmentation and merge parameters.

use align_cloud::Neighborhood;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{SegmentError, SegmentResult};

/// Parameters for region-growing segmentation.
///
/// # Example
///
/// ```
/// use align_segment::SegmentParams;
///
/// let params = SegmentParams::new()
///     .with_max_normal_angle(8.0_f64.to_radians())
///     .with_min_patch_size(200);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentParams {
    /// Points with a larger curvature never seed a patch. For meshes the
    /// seed test uses face roughness against `max_normal_angle` instead.
    /// Default: 0.02.
    pub max_seed_curvature: f64,

    /// Maximum angle (radians) between a candidate normal and the patch
    /// normal. Default: 10 degrees.
    pub max_normal_angle: f64,

    /// Bound on the residual standard deviation of a growing patch.
    /// Default: 0.01.
    pub max_std_dev: f64,

    /// Patches with fewer supporting points are discarded. Default: 50.
    pub min_patch_size: usize,

    /// Neighborhood explored around each accepted point. Default: 12 nearest.
    pub neighborhood: Neighborhood,

    /// The plane is re-fitted after this many accepted elements. Default: 64.
    pub refit_interval: usize,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            max_seed_curvature: 0.02,
            max_normal_angle: 10.0_f64.to_radians(),
            max_std_dev: 0.01,
            min_patch_size: 50,
            neighborhood: Neighborhood::Nearest(12),
            refit_interval: 64,
        }
    }
}

impl SegmentParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight thresholds for clean, dense scans.
    #[must_use]
    pub fn fine() -> Self {
        Self {
            max_seed_curvature: 0.01,
            max_normal_angle: 5.0_f64.to_radians(),
            max_std_dev: 0.005,
            min_patch_size: 100,
            neighborhood: Neighborhood::Nearest(16),
            refit_interval: 32,
        }
    }

    /// Loose thresholds for noisy or sparse scans.
    #[must_use]
    pub fn coarse() -> Self {
        Self {
            max_seed_curvature: 0.05,
            max_normal_angle: 20.0_f64.to_radians(),
            max_std_dev: 0.05,
            min_patch_size: 30,
            neighborhood: Neighborhood::Nearest(8),
            refit_interval: 128,
        }
    }

    /// Sets the seed curvature threshold.
    #[must_use]
    pub const fn with_max_seed_curvature(mut self, curvature: f64) -> Self {
        self.max_seed_curvature = curvature;
        self
    }

    /// Sets the normal angle threshold in radians.
    #[must_use]
    pub const fn with_max_normal_angle(mut self, radians: f64) -> Self {
        self.max_normal_angle = radians;
        self
    }

    /// Sets the residual standard deviation bound.
    #[must_use]
    pub const fn with_max_std_dev(mut self, std_dev: f64) -> Self {
        self.max_std_dev = std_dev;
        self
    }

    /// Sets the minimum patch size.
    #[must_use]
    pub const fn with_min_patch_size(mut self, size: usize) -> Self {
        self.min_patch_size = size;
        self
    }

    /// Sets the growth neighborhood.
    #[must_use]
    pub const fn with_neighborhood(mut self, neighborhood: Neighborhood) -> Self {
        self.neighborhood = neighborhood;
        self
    }

    /// Sets the refit interval.
    #[must_use]
    pub const fn with_refit_interval(mut self, interval: usize) -> Self {
        self.refit_interval = interval;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for out-of-range values.
    pub fn validate(&self) -> SegmentResult<()> {
        if !(self.max_seed_curvature.is_finite() && self.max_seed_curvature >= 0.0) {
            return Err(SegmentError::InvalidParameter(format!(
                "max_seed_curvature must be non-negative, got {}",
                self.max_seed_curvature
            )));
        }
        if !(self.max_normal_angle > 0.0 && self.max_normal_angle <= std::f64::consts::FRAC_PI_2)
        {
            return Err(SegmentError::InvalidParameter(format!(
                "max_normal_angle must be in (0, pi/2], got {}",
                self.max_normal_angle
            )));
        }
        if !(self.max_std_dev.is_finite() && self.max_std_dev > 0.0) {
            return Err(SegmentError::InvalidParameter(format!(
                "max_std_dev must be positive, got {}",
                self.max_std_dev
            )));
        }
        if self.min_patch_size < 3 {
            return Err(SegmentError::InvalidParameter(format!(
                "min_patch_size must be at least 3, got {}",
                self.min_patch_size
            )));
        }
        if self.refit_interval == 0 {
            return Err(SegmentError::InvalidParameter(
                "refit_interval must be at least 1".to_string(),
            ));
        }
        match self.neighborhood {
            Neighborhood::Nearest(k) if k < 2 => Err(SegmentError::InvalidParameter(format!(
                "growth neighborhood must hold at least 2 points, got {k}"
            ))),
            Neighborhood::Radius(r) if !(r.is_finite() && r > 0.0) => Err(
                SegmentError::InvalidParameter(format!("growth radius must be positive, got {r}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Parameters for merging coplanar patches.
///
/// Two adjacent patches merge when the angle between their normals is at
/// most `max_angle` and each centroid lies within
/// `max(base_distance, std_dev_scale * (std_a + std_b))` of the other plane.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MergeParams {
    /// Maximum angle (radians) between patch normals. Default: 5 degrees.
    pub max_angle: f64,

    /// Distance floor for the centroid test. Default: 0.01.
    pub base_distance: f64,

    /// Multiplier on the combined residual standard deviation. Default: 3.
    pub std_dev_scale: f64,

    /// For clouds: patches whose points come within this distance are
    /// adjacent. Default: 0.05.
    pub proximity: f64,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            max_angle: 5.0_f64.to_radians(),
            base_distance: 0.01,
            std_dev_scale: 3.0,
            proximity: 0.05,
        }
    }
}

impl MergeParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum normal angle in radians.
    #[must_use]
    pub const fn with_max_angle(mut self, radians: f64) -> Self {
        self.max_angle = radians;
        self
    }

    /// Sets the distance floor.
    #[must_use]
    pub const fn with_base_distance(mut self, distance: f64) -> Self {
        self.base_distance = distance;
        self
    }

    /// Sets the standard deviation multiplier.
    #[must_use]
    pub const fn with_std_dev_scale(mut self, scale: f64) -> Self {
        self.std_dev_scale = scale;
        self
    }

    /// Sets the cloud adjacency distance.
    #[must_use]
    pub const fn with_proximity(mut self, distance: f64) -> Self {
        self.proximity = distance;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidParameter`] for out-of-range values.
    pub fn validate(&self) -> SegmentResult<()> {
        let checks = [
            ("max_angle", self.max_angle),
            ("base_distance", self.base_distance),
            ("std_dev_scale", self.std_dev_scale),
            ("proximity", self.proximity),
        ];
        for (name, value) in checks {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SegmentError::InvalidParameter(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}
