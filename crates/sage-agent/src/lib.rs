//! Agent core for Sage.
//!
//! This crate is the heart of the chat backend: it classifies the incoming
//! question, decides whether to force a web search for URL-shaped queries,
//! drives the bounded model-call/tool-call loop in both buffered and
//! streaming form, and screens final answers for unsupported claims.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ChatEngine                                              │
//! │  classify → (forced search?) → model ⇄ tools → answer    │
//! └──────────────────────────────────────────────────────────┘
//!          │                │                  │
//!          ▼                ▼                  ▼
//!    ┌──────────┐    ┌────────────┐    ┌──────────────┐
//!    │ classify │    │ToolRegistry│    │ hallucination│
//!    └──────────┘    └────────────┘    └──────────────┘
//! ```

pub mod classify;
pub mod engine;
pub mod error;
pub mod hallucination;
pub mod prompt;
pub mod tool;
pub mod tools;
pub mod types;

pub use classify::{
    QueryType, ToolRequirement, classify, detect_url_patterns, extract_url_or_domain,
};
pub use engine::{ChatEngine, ChatEvent, ChatStream, EngineConfig, MAX_ITERATIONS_APOLOGY};
pub use error::{AgentError, Result};
pub use hallucination::{detect_risk, prepend_warning};
pub use prompt::{build_prompt, compose_system_prompt};
pub use tool::{Tool, ToolInvocation, ToolRegistry};
pub use tools::{CalculatorTool, WebSearchConfig, WebSearchTool};
pub use types::{
    HistoryMessage, ProjectProfile, SearchArchiveRequest, Speaker, TurnRequest,
};
