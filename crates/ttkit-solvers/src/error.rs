//! Error types for the solver layer.

use thiserror::Error;
use ttkit_tensortrain::TtError;

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;

/// Errors that can occur while running a solver.
#[derive(Error, Debug)]
pub enum SolverError {
    /// A chain-level operation failed.
    #[error(transparent)]
    Tensor(#[from] TtError),

    /// Measurements and iterate do not fit together.
    #[error("dimension mismatch: {message}")]
    DimensionMismatch { message: String },

    /// An argument is outside its admissible range.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl SolverError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        SolverError::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn dimension_mismatch(message: impl Into<String>) -> Self {
        SolverError::DimensionMismatch {
            message: message.into(),
        }
    }
}
