//! Error types for the retrieval crate.

use thiserror::Error;

/// Result type alias using the retrieval error type.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Error type for vector-store and retrieval operations.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The vector-store backend failed.
    #[error("vector store error: {0}")]
    Backend(String),

    /// Serialization error while building filters or payloads.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetrievalError {
    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
