//! Error types for the alignment pipeline.

use align_cloud::CloudError;
use align_registration::RegistrationError;
use align_segment::SegmentError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while driving a batch.
///
/// Inside [`AlignmentBatch::run`](crate::AlignmentBatch::run) a source
/// error only marks that source unaligned. Configuration errors and target
/// failures abort the batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An object could not be loaded.
    #[error("failed to load {object}: {reason}")]
    LoadFailure {
        /// Name of the object.
        object: String,
        /// Loader message.
        reason: String,
    },

    /// An operation needs the object's data before it was loaded.
    #[error("{object} has not been loaded")]
    NotLoaded {
        /// Name of the object.
        object: String,
    },

    /// The configuration cannot be satisfied.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A file was readable but its content was not.
    #[error("invalid file content: {message}")]
    InvalidContent {
        /// Description of what was invalid.
        message: String,
    },

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Point cloud preparation failed.
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// Segmentation failed.
    #[error(transparent)]
    Segment(#[from] SegmentError),

    /// Registration failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl PipelineError {
    pub(crate) fn invalid_content(message: impl Into<String>) -> Self {
        Self::InvalidContent {
            message: message.into(),
        }
    }

    /// Returns true for errors no input could avoid: they come from the
    /// configuration and abort a whole batch.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration(_)
            | Self::Cloud(CloudError::InvalidParameter { .. })
            | Self::Registration(RegistrationError::InvalidParameter(_)) => true,
            Self::Segment(err) => err.is_configuration(),
            _ => false,
        }
    }
}
