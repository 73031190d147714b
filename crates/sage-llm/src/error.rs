//! Error types for the model backend crate.

use thiserror::Error;

/// Result type alias using the model backend error type.
pub type Result<T> = std::result::Result<T, LmError>;

/// Error type for model backend operations.
#[derive(Debug, Error)]
pub enum LmError {
    /// The call exceeded its configured timeout.
    #[error("model call timed out after {0} seconds")]
    Timeout(u64),

    /// The provider could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider returned an error or an unusable status.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider returned a response the client could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LmError {
    /// True when the error is the per-call timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for LmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured duration here
            LmError::Timeout(0)
        } else if err.is_connect() {
            LmError::Connection(err.to_string())
        } else {
            LmError::Provider(err.to_string())
        }
    }
}
