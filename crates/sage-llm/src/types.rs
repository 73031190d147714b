//! Request and output types for model backends.
//!
//! [`ModelOutput`] is deliberately a tagged union: the agent loop branches
//! on text-vs-tool-call, and an enum makes that branching exhaustive at
//! compile time instead of duck-typing on a dictionary shape.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-call timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─────────────────────────────────────────────────────────────────────────────
// Tool Specs
// ─────────────────────────────────────────────────────────────────────────────

/// Definition of a tool offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name of the tool.
    pub name: String,
    /// Description of what the tool does.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: serde_json::Value,
}

impl ToolSpec {
    /// Create a new tool spec.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Render this spec in the OpenAI function-calling shape most local
    /// model servers accept.
    pub fn to_function_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generate Request
// ─────────────────────────────────────────────────────────────────────────────

/// A generation request for a model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The assembled textual prompt (context, history, current question).
    pub prompt: String,

    /// System instructions, kept separate from the prompt body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Tools the model may call. Empty means the model answers in text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,

    /// Optional model override; the backend's configured model otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Whether the backend should run on GPU.
    #[serde(default = "default_prefer_gpu")]
    pub prefer_gpu: bool,

    /// Hard per-call timeout, enforced by the backend.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

fn default_prefer_gpu() -> bool {
    true
}

impl GenerateRequest {
    /// Create a new request with the given prompt and default settings.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            tools: Vec::new(),
            model: None,
            prefer_gpu: true,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Offer tools to the model.
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Override the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the GPU preference.
    pub fn with_prefer_gpu(mut self, prefer_gpu: bool) -> Self {
        self.prefer_gpu = prefer_gpu;
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model Output
// ─────────────────────────────────────────────────────────────────────────────

/// A structured tool-call request from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: serde_json::Value,
    /// Provider-assigned call id, when the backend supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ToolCallRequest {
    /// Create a tool call request without a provider id.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            call_id: None,
        }
    }

    /// The call id, defaulting to `call_<name>` when the provider omitted one.
    pub fn id(&self) -> String {
        self.call_id
            .clone()
            .unwrap_or_else(|| format!("call_{}", self.name))
    }
}

/// What the model produced: a finished text answer, or a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelOutput {
    /// Free-text answer.
    Text { content: String },
    /// Structured request to invoke a tool.
    ToolCall(ToolCallRequest),
}

impl ModelOutput {
    /// Create a text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create a tool-call output.
    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ToolCall(ToolCallRequest::new(name, arguments))
    }

    /// True when this is a tool call.
    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall(_))
    }

    /// The text content, if this is a text output.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            Self::ToolCall(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Events
// ─────────────────────────────────────────────────────────────────────────────

/// Events emitted by a streaming generation.
///
/// A stream is a sequence of text fragments, possibly ending in a tool
/// call; a terminal [`StreamEvent::Error`] replaces a raised error so the
/// consumer can surface it in-band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of the text answer.
    Token { content: String },
    /// The model decided to call a tool; the stream ends after this.
    ToolCall(ToolCallRequest),
    /// Terminal error; the stream ends after this.
    Error { message: String },
}

impl StreamEvent {
    /// Create a token event.
    pub fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: content.into(),
        }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// True for events after which the stream ends.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ToolCall(_) | Self::Error { .. })
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
