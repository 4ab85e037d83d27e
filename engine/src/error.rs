//! Error types for the docmap engine.

use thiserror::Error;

/// All possible errors from the docmap engine.
///
/// Every variant is raised while a request is being prepared, before anything
/// reaches the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Model definition errors
    #[error("missing schema: {0}")]
    MissingSchema(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    // Conversion errors
    #[error("type mismatch for attribute '{attribute}': expected {expected}, got {got}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        got: String,
    },

    // Validation errors
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl Error {
    pub(crate) fn type_mismatch(
        attribute: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            attribute: attribute.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
