//! Tunables the orchestrator depends on.

/// Number of prior messages included in the model context window.
pub const CONVERSATION_HISTORY_LIMIT: usize = 10;

/// Fallback title length: prefix of the first user message.
pub const AUTO_TITLE_MAX_LENGTH: usize = 50;

/// Hard cap on generated titles before they are elided.
pub const TITLE_DISPLAY_MAX: usize = 100;

/// Character size of chunks indexed from archived documents.
pub const CHUNK_SIZE: usize = 1000;

/// Character overlap between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 200;
