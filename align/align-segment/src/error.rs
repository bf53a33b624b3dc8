//! Error types for segmentation and merging.

use align_plane::PlaneError;
use thiserror::Error;

/// Result type for segmentation operations.
pub type SegmentResult<T> = Result<T, SegmentError>;

/// Errors that can occur during segmentation or merging.
///
/// A patch that ends up below the minimum size is not an error: it is
/// discarded, logged and counted in the segmentation statistics.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Some points lack the normal or curvature the segmenter needs.
    #[error("{missing} of {total} points have no normal or curvature")]
    MissingNormals {
        /// Points without normal or curvature.
        missing: usize,
        /// Total number of points.
        total: usize,
    },

    /// The thresholds leave nothing to seed a patch from.
    #[error("no eligible seeds among {elements} elements (seed threshold {threshold})")]
    NoEligibleSeeds {
        /// Number of candidate elements (points or faces).
        elements: usize,
        /// The seed threshold that excluded all of them.
        threshold: f64,
    },

    /// Mesh has no faces.
    #[error("mesh is empty")]
    EmptyMesh,

    /// A face references a vertex that does not exist.
    #[error("vertex index {vertex_idx} out of bounds (mesh has {vertex_count} vertices)")]
    VertexOutOfBounds {
        /// The invalid vertex index.
        vertex_idx: usize,
        /// Total number of vertices in the mesh.
        vertex_count: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Plane fitting failed.
    #[error(transparent)]
    Plane(#[from] PlaneError),
}

impl SegmentError {
    /// Returns true for errors caused by the configuration rather than the input.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::NoEligibleSeeds { .. } | Self::InvalidParameter(_))
    }
}
