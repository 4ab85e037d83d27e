//! Unified error handling for models.

/// Error returned by the store client.
///
/// Carries the store's error code and message unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: String,
    pub message: String,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Model error type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Engine error: {0}")]
    Engine(#[from] docmap_engine::Error),

    #[error("Wait for active timed out after {elapsed_ms} milliseconds for table {table}")]
    WaitForActiveTimeout { table: String, elapsed_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The setup pipeline failed; the model will never become ready.
    #[error("Setup failed for table {table}: {reason}")]
    Setup { table: String, reason: String },
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
