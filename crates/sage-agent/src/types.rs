//! Core types for the agent crate.

use serde::{Deserialize, Serialize};

/// Who produced a history message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Transcript label for this speaker.
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        }
    }
}

/// A prior message handed to the engine as conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Who said it.
    pub role: Speaker,
    /// The message text.
    pub content: String,
}

impl HistoryMessage {
    /// Create a user history message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            content: content.into(),
        }
    }

    /// Create an assistant history message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
        }
    }
}

/// Read-only project configuration the engine consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectProfile {
    /// Project id (used for archive requests).
    pub id: i64,
    /// Display name, used as the fallback subject line.
    pub name: String,
    /// Project-specific system prompt, appended last.
    pub system_prompt: Option<String>,
    /// Names of tools enabled for this project.
    pub enabled_tools: Vec<String>,
}

impl ProjectProfile {
    /// True when the given tool is enabled.
    pub fn has_tool(&self, name: &str) -> bool {
        self.enabled_tools.iter().any(|t| t == name)
    }
}

/// Everything the engine needs for one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// The user's message.
    pub message: String,
    /// Bounded window of prior turns, oldest first.
    pub history: Vec<HistoryMessage>,
    /// Formatted document context from retrieval, if any.
    pub document_context: Option<String>,
    /// Project configuration.
    pub profile: ProjectProfile,
    /// Whether the backend should run on GPU.
    pub prefer_gpu: bool,
    /// Optional model override for this turn.
    pub model: Option<String>,
}

impl TurnRequest {
    /// Create a turn request with defaults for the optional knobs.
    pub fn new(message: impl Into<String>, profile: ProjectProfile) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            document_context: None,
            profile,
            prefer_gpu: true,
            model: None,
        }
    }

    /// Attach conversation history.
    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    /// Attach document context.
    pub fn with_document_context(mut self, context: impl Into<String>) -> Self {
        self.document_context = Some(context.into());
        self
    }
}

/// Request to archive successful web-search results as a project document.
///
/// Produced by the engine, consumed by a background worker; carries the raw
/// result objects from the search tool's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchArchiveRequest {
    /// Project to attach the document to.
    pub project_id: i64,
    /// The search query that produced the results.
    pub query: String,
    /// Raw search hits as returned in tool metadata.
    pub results: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_labels() {
        assert_eq!(Speaker::User.label(), "User");
        assert_eq!(Speaker::Assistant.label(), "Assistant");
    }

    #[test]
    fn test_profile_has_tool() {
        let profile = ProjectProfile {
            enabled_tools: vec!["web_search".to_string()],
            ..Default::default()
        };
        assert!(profile.has_tool("web_search"));
        assert!(!profile.has_tool("calculator"));
    }
}
