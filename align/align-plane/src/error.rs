//! Error types for plane fitting.

use thiserror::Error;

/// Errors that can occur while fitting or editing a plane.
#[derive(Debug, Error)]
pub enum PlaneError {
    /// The point set does not determine a unique plane.
    #[error("degenerate plane fit over {points} points: {reason}")]
    DegeneratePlaneFit {
        /// Number of points in the fit.
        points: usize,
        /// Why the fit is degenerate.
        reason: String,
    },

    /// A point index is outside the point slice.
    #[error("point index {index} out of bounds for {len} points")]
    IndexOutOfBounds {
        /// The invalid index.
        index: usize,
        /// Number of points available.
        len: usize,
    },
}

/// Result type for plane operations.
pub type PlaneResult<T> = Result<T, PlaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PlaneError::DegeneratePlaneFit {
            points: 2,
            reason: "fewer than 3 points".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "degenerate plane fit over 2 points: fewer than 3 points"
        );

        let err = PlaneError::IndexOutOfBounds { index: 9, len: 4 };
        assert_eq!(err.to_string(), "point index 9 out of bounds for 4 points");
    }
}
