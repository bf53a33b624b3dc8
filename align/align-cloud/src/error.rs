//! Error types for point cloud processing.

use thiserror::Error;

/// Errors that can occur while preparing a point cloud.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The point cloud has no points.
    #[error("point cloud is empty")]
    EmptyPointCloud,

    /// Not enough points for the requested operation.
    #[error("insufficient points: need at least {required}, got {actual}")]
    InsufficientPoints {
        /// Minimum number of points required.
        required: usize,
        /// Actual number of points provided.
        actual: usize,
    },

    /// A parameter is out of its valid range.
    #[error("invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of the invalid parameter.
        reason: String,
    },
}

/// Result type for point cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;
