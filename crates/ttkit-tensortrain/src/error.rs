//! Error types for tensor-train operations.

use thiserror::Error;

/// Result type for tensor-train operations.
pub type Result<T> = std::result::Result<T, TtError>;

/// Errors that can occur during tensor-train operations.
#[derive(Error, Debug)]
pub enum TtError {
    /// An argument is outside its admissible range (bad rank or dimension
    /// tuple, tolerance outside `[0, 1)`, core position out of range, ...).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A binary operation was attempted on chains with incompatible
    /// external dimensions, or an index tuple of the wrong length.
    #[error("dimension mismatch: {message}")]
    DimensionMismatch { message: String },

    /// A component shape is inconsistent with the ranks of its neighbors.
    /// Only raised by debug builds.
    #[error("invariant violated: {message}")]
    InvariantViolated { message: String },

    /// The linear algebra backend failed to converge.
    #[error("numeric failure: {message}")]
    NumericFailure { message: String },

    /// The requested operation is not supported for this representation.
    #[error("unsupported operation: {message}")]
    Unsupported { message: String },
}

impl TtError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        TtError::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn dimension_mismatch(message: impl Into<String>) -> Self {
        TtError::DimensionMismatch {
            message: message.into(),
        }
    }
}
