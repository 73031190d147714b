//! Model backend abstraction for Sage.
//!
//! This crate defines the boundary between the chat core and whatever
//! language model actually answers: a request type, a tagged output type
//! (free text or a structured tool call), a streaming variant, and the
//! [`LmBackend`] trait that providers implement.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  LmBackend trait                            │
//! │  - generate() -> ModelOutput                │
//! │  - generate_stream() -> Stream<StreamEvent> │
//! └─────────────────────────────────────────────┘
//!                      │
//!           ┌──────────┴──────────┐
//!           ▼                     ▼
//!      ┌─────────┐          ┌──────────┐
//!      │ Ollama  │          │ Mock     │
//!      └─────────┘          └──────────┘
//! ```

pub mod backend;
pub mod error;
pub mod ollama;
pub mod types;

pub use backend::{LmBackend, MockBackend, MockReply, ModelStream, SharedBackend};
pub use error::{LmError, Result};
pub use ollama::{OllamaBackend, OllamaConfig};
pub use types::{GenerateRequest, ModelOutput, StreamEvent, ToolCallRequest, ToolSpec};
