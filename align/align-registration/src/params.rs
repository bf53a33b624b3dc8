//! Parameters for plane matching and staged registration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, RegistrationResult};
use crate::icp::IcpParams;

/// Minimum number of plane pairs that constrains a rigid transform.
pub const MIN_PLANE_PAIRS: usize = 3;

/// Parameters for the rigid-invariant correspondence search.
///
/// Two source patches `(i, j)` are consistent with two target patches
/// `(a, b)` when the angle between their planes differs by at most
/// `angle_tolerance` and their centroid distance differs by at most
/// `distance_tolerance + relative_distance_tolerance * distance`.
///
/// # Example
///
/// ```
/// use align_registration::MatchParams;
///
/// let params = MatchParams::new()
///     .with_max_patches(8)
///     .with_angle_tolerance(3.0_f64.to_radians());
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchParams {
    /// Only the largest patches of each set take part in the search
    /// (sampling cap). Default: 12.
    pub max_patches: usize,

    /// Tolerance on inter-plane angles, radians. Default: 5 degrees.
    pub angle_tolerance: f64,

    /// Absolute tolerance on inter-centroid distances. Default: 0.05.
    pub distance_tolerance: f64,

    /// Tolerance on inter-centroid distances relative to the distance.
    /// Default: 0.05.
    pub relative_distance_tolerance: f64,

    /// Seed triples need every pairwise normal angle at least this large,
    /// radians. Default: 30 degrees.
    pub min_triple_angle: f64,

    /// Fewest pairs accepted as a correspondence. Default: 3.
    pub min_pairs: usize,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            max_patches: 12,
            angle_tolerance: 5.0_f64.to_radians(),
            distance_tolerance: 0.05,
            relative_distance_tolerance: 0.05,
            min_triple_angle: 30.0_f64.to_radians(),
            min_pairs: MIN_PLANE_PAIRS,
        }
    }
}

impl MatchParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sampling cap.
    #[must_use]
    pub const fn with_max_patches(mut self, max_patches: usize) -> Self {
        self.max_patches = max_patches;
        self
    }

    /// Sets the angle tolerance in radians.
    #[must_use]
    pub const fn with_angle_tolerance(mut self, radians: f64) -> Self {
        self.angle_tolerance = radians;
        self
    }

    /// Sets the absolute distance tolerance.
    #[must_use]
    pub const fn with_distance_tolerance(mut self, distance: f64) -> Self {
        self.distance_tolerance = distance;
        self
    }

    /// Sets the relative distance tolerance.
    #[must_use]
    pub const fn with_relative_distance_tolerance(mut self, ratio: f64) -> Self {
        self.relative_distance_tolerance = ratio;
        self
    }

    /// Sets the minimum seed triple angle in radians.
    #[must_use]
    pub const fn with_min_triple_angle(mut self, radians: f64) -> Self {
        self.min_triple_angle = radians;
        self
    }

    /// Sets the minimum number of pairs.
    #[must_use]
    pub const fn with_min_pairs(mut self, min_pairs: usize) -> Self {
        self.min_pairs = min_pairs;
        self
    }

    /// Distance tolerance for a pair of centroid distances.
    #[must_use]
    pub fn distance_tolerance_for(&self, a: f64, b: f64) -> f64 {
        self.relative_distance_tolerance
            .mul_add(a.max(b), self.distance_tolerance)
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidParameter`] for out-of-range values.
    pub fn validate(&self) -> RegistrationResult<()> {
        if self.max_patches < MIN_PLANE_PAIRS {
            return Err(RegistrationError::InvalidParameter(format!(
                "max_patches must be at least {MIN_PLANE_PAIRS}, got {}",
                self.max_patches
            )));
        }
        if self.min_pairs < MIN_PLANE_PAIRS {
            return Err(RegistrationError::InvalidParameter(format!(
                "min_pairs must be at least {MIN_PLANE_PAIRS}, got {}",
                self.min_pairs
            )));
        }
        positive("angle_tolerance", self.angle_tolerance)?;
        positive("distance_tolerance", self.distance_tolerance)?;
        non_negative("relative_distance_tolerance", self.relative_distance_tolerance)?;
        if !(self.min_triple_angle >= 0.0 && self.min_triple_angle <= std::f64::consts::FRAC_PI_2)
        {
            return Err(RegistrationError::InvalidParameter(format!(
                "min_triple_angle must be in [0, pi/2], got {}",
                self.min_triple_angle
            )));
        }
        Ok(())
    }
}

/// Parameters for the refinement stage, which re-matches every patch by
/// proximity once the coarse transform has been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefineParams {
    /// Maximum angle between an aligned source plane and its target,
    /// radians. Default: 3 degrees.
    pub angle_tolerance: f64,

    /// Maximum distance of either centroid from the other plane.
    /// Default: 0.05.
    pub plane_distance: f64,

    /// Maximum centroid distance as a multiple of the larger patch extent.
    /// Default: 0.5.
    pub centroid_distance_factor: f64,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            angle_tolerance: 3.0_f64.to_radians(),
            plane_distance: 0.05,
            centroid_distance_factor: 0.5,
        }
    }
}

impl RefineParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the angle tolerance in radians.
    #[must_use]
    pub const fn with_angle_tolerance(mut self, radians: f64) -> Self {
        self.angle_tolerance = radians;
        self
    }

    /// Sets the plane distance tolerance.
    #[must_use]
    pub const fn with_plane_distance(mut self, distance: f64) -> Self {
        self.plane_distance = distance;
        self
    }

    /// Sets the centroid distance factor.
    #[must_use]
    pub const fn with_centroid_distance_factor(mut self, factor: f64) -> Self {
        self.centroid_distance_factor = factor;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidParameter`] for out-of-range values.
    pub fn validate(&self) -> RegistrationResult<()> {
        positive("refine angle_tolerance", self.angle_tolerance)?;
        positive("refine plane_distance", self.plane_distance)?;
        positive("centroid_distance_factor", self.centroid_distance_factor)
    }
}

/// Parameters for the whole staged registration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegistrationParams {
    /// Correspondence search.
    pub matching: MatchParams,
    /// Proximity re-matching after the coarse solve.
    pub refine: RefineParams,
    /// Final point-level polish.
    pub icp: IcpParams,
}

impl RegistrationParams {
    /// Creates new parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerances for noisy scans where segmentations differ more between
    /// captures.
    #[must_use]
    pub fn tolerant() -> Self {
        Self {
            matching: MatchParams::default()
                .with_angle_tolerance(10.0_f64.to_radians())
                .with_distance_tolerance(0.2)
                .with_relative_distance_tolerance(0.15),
            refine: RefineParams::default()
                .with_angle_tolerance(6.0_f64.to_radians())
                .with_plane_distance(0.2)
                .with_centroid_distance_factor(1.0),
            icp: IcpParams::default(),
        }
    }

    /// Sets the matching parameters.
    #[must_use]
    pub const fn with_matching(mut self, matching: MatchParams) -> Self {
        self.matching = matching;
        self
    }

    /// Sets the refinement parameters.
    #[must_use]
    pub const fn with_refine(mut self, refine: RefineParams) -> Self {
        self.refine = refine;
        self
    }

    /// Sets the ICP parameters.
    #[must_use]
    pub const fn with_icp(mut self, icp: IcpParams) -> Self {
        self.icp = icp;
        self
    }

    /// Validates every stage.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidParameter`] for out-of-range values.
    pub fn validate(&self) -> RegistrationResult<()> {
        self.matching.validate()?;
        self.refine.validate()?;
        self.icp.validate()
    }
}

fn positive(name: &str, value: f64) -> RegistrationResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RegistrationError::InvalidParameter(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn non_negative(name: &str, value: f64) -> RegistrationResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RegistrationError::InvalidParameter(format!(
            "{name} must be non-negative, got {value}"
        )))
    }
}
