//! Conversation orchestrator for Sage.
//!
//! Wraps the loop engine with the persistence concerns that affect its
//! observable behavior: the user message is stored before any model call,
//! history is a bounded window of prior turns, token counters only grow,
//! conversations are auto-titled once, and successful web searches are
//! archived as project documents by a detached worker.

pub mod archive;
pub mod constants;
pub mod error;
pub mod service;
pub mod tokens;

pub use archive::{archive_search_results, spawn_search_archiver};
pub use error::{ChatError, Result};
pub use service::{
    ChatConfig, ChatRequest, ChatResponse, ChatResponseStream, ChatService, ChatStreamEvent,
};
pub use tokens::estimate_tokens;
