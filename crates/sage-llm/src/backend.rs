//! The [`LmBackend`] trait and the scripted mock used across the test
//! suites.

use async_trait::async_trait;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;

use crate::error::{LmError, Result};
use crate::types::{GenerateRequest, ModelOutput, StreamEvent};

/// A streaming response from a model backend.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

/// Trait for model backend providers.
///
/// Implementations connect the chat core to an actual model server. The
/// backend enforces its own per-call timeout (taken from the request) and
/// never retries; retry policy, if any, belongs to the provider.
#[async_trait]
pub trait LmBackend: Send + Sync {
    /// Run a generation to completion and return the full output.
    async fn generate(&self, request: GenerateRequest) -> Result<ModelOutput>;

    /// Run a generation as a stream of events.
    async fn generate_stream(&self, request: GenerateRequest) -> Result<ModelStream>;

    /// Name of this backend.
    fn name(&self) -> &str;

    /// Check that the backend is reachable and configured.
    async fn health_check(&self) -> Result<()>;
}

/// A backend that can be shared across tasks.
pub type SharedBackend = Arc<dyn LmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted reply for [`MockBackend`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this output.
    Output(ModelOutput),
    /// Fail with a provider error carrying this message.
    Error(String),
}

/// A mock backend for deterministic tests.
///
/// Replies are returned in order; requests are logged so tests can assert
/// on what the loop actually sent (system prompts, offered tools, models).
#[derive(Debug, Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    request_log: Mutex<Vec<GenerateRequest>>,
}

impl MockBackend {
    /// Create a mock backend returning the given outputs in order.
    pub fn new(outputs: Vec<ModelOutput>) -> Self {
        Self {
            replies: Mutex::new(outputs.into_iter().map(MockReply::Output).collect()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend with a single text reply.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![ModelOutput::text(text)])
    }

    /// Create a mock backend with explicit replies, including errors.
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// All requests made so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.request_log.lock().unwrap().clone()
    }

    /// Number of requests made so far.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().unwrap().len()
    }

    fn next_reply(&self, request: GenerateRequest) -> Result<ModelOutput> {
        self.request_log.lock().unwrap().push(request);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LmError::Provider("MockBackend: no more replies".to_string()))?;

        match reply {
            MockReply::Output(output) => Ok(output),
            MockReply::Error(message) => Err(LmError::Provider(message)),
        }
    }
}

#[async_trait]
impl LmBackend for MockBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelOutput> {
        self.next_reply(request)
    }

    async fn generate_stream(&self, request: GenerateRequest) -> Result<ModelStream> {
        // Errors surface in-band, matching how a live stream fails mid-flight.
        let events: Vec<Result<StreamEvent>> = match self.next_reply(request) {
            Ok(ModelOutput::Text { content }) => split_into_tokens(&content)
                .into_iter()
                .map(|t| Ok(StreamEvent::token(t)))
                .collect(),
            Ok(ModelOutput::ToolCall(call)) => vec![Ok(StreamEvent::ToolCall(call))],
            Err(e) => vec![Ok(StreamEvent::error(e.to_string()))],
        };

        Ok(Box::pin(futures::stream::iter(events)))
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Split a text reply into word-sized fragments so stream consumers see
/// more than one token.
fn split_into_tokens(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut tokens = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(' ') {
        tokens.push(rest[..=pos].to_string());
        rest = &rest[pos + 1..];
    }
    if !rest.is_empty() {
        tokens.push(rest.to_string());
    }
    tokens
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
