//! Error types for registration operations.

use thiserror::Error;

/// Errors that can occur during registration.
///
/// An ICP run that hits its iteration cap is not an error: it is reported
/// through `IcpResult::converged` and a reduced confidence.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Source has no points or patches.
    #[error("source has no points")]
    EmptySourceMesh,

    /// Target has no points or patches.
    #[error("target has no points")]
    EmptyTargetMesh,

    /// Too few geometrically consistent plane pairs to constrain a rigid
    /// transform.
    #[error("insufficient correspondences: found {found}, at least {required} required")]
    InsufficientCorrespondences {
        /// Largest consistent pair set found.
        found: usize,
        /// Minimum number of pairs required.
        required: usize,
    },

    /// The matched normals do not span enough directions to fix a rotation.
    #[error("matched plane normals are degenerate (rank {rank})")]
    DegenerateNormals {
        /// Numerical rank of the normal cross-covariance.
        rank: usize,
    },

    /// SVD computation failed during transform estimation.
    #[error("SVD computation failed during transform estimation")]
    SvdFailed,

    /// No valid correspondences found between point sets.
    #[error("no valid correspondences found between point sets")]
    NoCorrespondences,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RegistrationError::InsufficientCorrespondences {
            found: 2,
            required: 3,
        };
        assert_eq!(
            err.to_string(),
            "insufficient correspondences: found 2, at least 3 required"
        );
    }
}
