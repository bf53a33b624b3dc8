//! Pipeline configuration.

use align_cloud::NormalParams;
use align_registration::RegistrationParams;
use align_segment::{MergeParams, SegmentParams};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Every threshold the pipeline consumes, grouped by stage.
///
/// No file format is owned here; with the `serde` feature the struct can be
/// read from whatever format the caller prefers.
///
/// # Example
///
/// ```
/// use align_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::default().with_voxel_leaf(0.01);
/// assert!(config.validate().is_ok());
/// assert!(PipelineConfig::default().with_voxel_leaf(-1.0).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// Normal and curvature estimation for clouds.
    pub normals: NormalParams,

    /// Voxel size for cloud resampling; `None` keeps every point.
    pub voxel_leaf: Option<f64>,

    /// Region growing.
    pub segment: SegmentParams,

    /// Coplanar patch merging.
    pub merge: MergeParams,

    /// Matching, refinement and ICP.
    pub registration: RegistrationParams,
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Small, tight patches for clean scans.
    #[must_use]
    pub fn fine() -> Self {
        Self {
            segment: SegmentParams::fine(),
            ..Self::default()
        }
    }

    /// Large tolerances for noisy, sparse scans.
    #[must_use]
    pub fn coarse() -> Self {
        Self {
            normals: NormalParams::high_quality(),
            segment: SegmentParams::coarse(),
            registration: RegistrationParams::tolerant(),
            ..Self::default()
        }
    }

    /// Sets the normal estimation parameters.
    #[must_use]
    pub const fn with_normals(mut self, normals: NormalParams) -> Self {
        self.normals = normals;
        self
    }

    /// Resamples clouds on a voxel grid before segmentation.
    #[must_use]
    pub const fn with_voxel_leaf(mut self, leaf: f64) -> Self {
        self.voxel_leaf = Some(leaf);
        self
    }

    /// Sets the segmentation parameters.
    #[must_use]
    pub const fn with_segment(mut self, segment: SegmentParams) -> Self {
        self.segment = segment;
        self
    }

    /// Sets the merge parameters.
    #[must_use]
    pub const fn with_merge(mut self, merge: MergeParams) -> Self {
        self.merge = merge;
        self
    }

    /// Sets the registration parameters.
    #[must_use]
    pub const fn with_registration(mut self, registration: RegistrationParams) -> Self {
        self.registration = registration;
        self
    }

    /// Validates every stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] naming the first invalid
    /// value.
    pub fn validate(&self) -> PipelineResult<()> {
        let config = |e: &dyn std::fmt::Display| PipelineError::Configuration(e.to_string());
        self.normals.validate().map_err(|e| config(&e))?;
        if let Some(leaf) = self.voxel_leaf {
            if !(leaf.is_finite() && leaf > 0.0) {
                return Err(PipelineError::Configuration(format!(
                    "voxel leaf must be positive, got {leaf}"
                )));
            }
        }
        self.segment.validate().map_err(|e| config(&e))?;
        self.merge.validate().map_err(|e| config(&e))?;
        self.registration.validate().map_err(|e| config(&e))
    }
}
