//! Error types for the store crate.

use thiserror::Error;

/// Result type alias using the store error type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A referenced row does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A serialized column failed to round-trip.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value is malformed.
    #[error("corrupt value: {0}")]
    Corrupt(String),
}
