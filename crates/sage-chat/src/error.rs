//! Error types for the orchestrator crate.

use thiserror::Error;

/// Result type alias using the chat error type.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Error type for the conversation orchestrator.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] sage_store::StoreError),

    /// Engine or tool failure.
    #[error("agent error: {0}")]
    Agent(#[from] sage_agent::AgentError),

    /// Direct model failure (e.g. title generation).
    #[error("model error: {0}")]
    Model(#[from] sage_llm::LmError),

    /// Vector-store failure while archiving.
    #[error("retrieval error: {0}")]
    Retrieval(#[from] sage_retrieval::RetrievalError),

    /// The request referenced a project that does not exist.
    #[error("project {0} not found")]
    ProjectNotFound(i64),
}
