//! The [`ChatService`]: the persistence envelope around the loop engine.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

use sage_agent::{
    ChatEngine, ChatEvent, HistoryMessage, ProjectProfile, Speaker, TurnRequest,
};
use sage_llm::{GenerateRequest, ModelOutput};
use sage_retrieval::ContextRetriever;
use sage_store::{ChatStore, Conversation, MessageRecord, MessageRole, NewMessage};

use crate::constants::{AUTO_TITLE_MAX_LENGTH, CONVERSATION_HISTORY_LIMIT, TITLE_DISPLAY_MAX};
use crate::error::{ChatError, Result};
use crate::tokens::estimate_tokens;

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

/// One incoming chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Project the conversation belongs to.
    pub project_id: i64,
    /// Existing conversation to continue, or none to start one.
    pub conversation_id: Option<i64>,
    /// The user's message.
    pub message: String,
    /// Documents selected for retrieval context (opt-in per request).
    #[serde(default)]
    pub document_ids: Vec<i64>,
    /// Whether the backend should run on GPU.
    #[serde(default = "default_prefer_gpu")]
    pub prefer_gpu: bool,
    /// Optional model override for this turn.
    pub model: Option<String>,
}

fn default_prefer_gpu() -> bool {
    true
}

impl ChatRequest {
    /// Create a request with defaults for the optional knobs.
    pub fn new(project_id: i64, message: impl Into<String>) -> Self {
        Self {
            project_id,
            conversation_id: None,
            message: message.into(),
            document_ids: Vec::new(),
            prefer_gpu: true,
            model: None,
        }
    }

    /// Continue an existing conversation.
    pub fn with_conversation(mut self, conversation_id: i64) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    /// Select documents for retrieval context.
    pub fn with_documents(mut self, document_ids: Vec<i64>) -> Self {
        self.document_ids = document_ids;
        self
    }
}

/// Result of a buffered chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub conversation_id: i64,
    pub user_message: MessageRecord,
    pub assistant_message: MessageRecord,
}

/// Events emitted by a streaming chat turn: engine events followed by a
/// terminal done marker (absent when the stream ends in an error).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatStreamEvent {
    Event(ChatEvent),
    Done { done: bool, conversation_id: i64 },
}

impl ChatStreamEvent {
    /// The terminal marker for a completed stream.
    pub fn done(conversation_id: i64) -> Self {
        Self::Done {
            done: true,
            conversation_id,
        }
    }
}

/// A stream of chat events for one turn.
pub type ChatResponseStream = Pin<Box<dyn Stream<Item = ChatStreamEvent> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Prior messages included as model context.
    pub history_limit: usize,
    /// Length of the fallback title prefix.
    pub auto_title_max: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: CONVERSATION_HISTORY_LIMIT,
            auto_title_max: AUTO_TITLE_MAX_LENGTH,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrates one chat turn: persistence, retrieval, the engine, token
/// accounting, and auto-titling.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<ChatStore>,
    engine: Arc<ChatEngine>,
    retriever: Option<Arc<ContextRetriever>>,
    config: ChatConfig,
}

impl ChatService {
    /// Create a service over the given store and engine.
    pub fn new(
        store: Arc<ChatStore>,
        engine: ChatEngine,
        retriever: Option<ContextRetriever>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            engine: Arc::new(engine),
            retriever: retriever.map(Arc::new),
            config,
        }
    }

    /// Run one buffered turn.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let (turn, conversation, user_message) = self.prepare_turn(&request).await?;

        let answer = self.engine.run(&turn).await?;

        let assistant_tokens = estimate_tokens(&answer) as i64;
        let assistant_message = self.store.insert_message(NewMessage {
            conversation_id: conversation.id,
            role: MessageRole::Assistant,
            content: answer,
            token_count: assistant_tokens,
        })?;
        self.store
            .add_tokens(conversation.id, user_message.token_count + assistant_tokens)?;

        if request.conversation_id.is_none() && conversation.title.is_none() {
            self.auto_title(conversation.id, &request.message).await;
        }

        tracing::info!(
            conversation_id = conversation.id,
            user_tokens = user_message.token_count,
            assistant_tokens,
            "Turn completed"
        );

        Ok(ChatResponse {
            conversation_id: conversation.id,
            user_message,
            assistant_message,
        })
    }

    /// Run one streaming turn.
    ///
    /// The user message is persisted before the stream is returned; the
    /// assistant message is persisted only when the stream finishes without
    /// a terminal error.
    pub async fn chat_stream(&self, request: ChatRequest) -> Result<ChatResponseStream> {
        let (turn, conversation, user_message) = self.prepare_turn(&request).await?;

        let service = self.clone();
        let conversation_id = conversation.id;
        let should_title = request.conversation_id.is_none() && conversation.title.is_none();
        let message = request.message.clone();
        let user_tokens = user_message.token_count;

        Ok(Box::pin(async_stream::stream! {
            let mut inner = service.engine.run_stream(turn);
            let mut full_response = String::new();

            while let Some(event) = inner.next().await {
                let failed = matches!(event, ChatEvent::Error { .. });
                if let ChatEvent::Token { content } = &event {
                    full_response.push_str(content);
                }
                yield ChatStreamEvent::Event(event);
                if failed {
                    // User message is already safe; the assistant message
                    // is only stored on a successful outcome.
                    return;
                }
            }

            let assistant_tokens = estimate_tokens(&full_response) as i64;
            match service.store.insert_message(NewMessage {
                conversation_id,
                role: MessageRole::Assistant,
                content: full_response,
                token_count: assistant_tokens,
            }) {
                Ok(_) => {
                    if let Err(e) = service
                        .store
                        .add_tokens(conversation_id, user_tokens + assistant_tokens)
                    {
                        tracing::warn!(conversation_id, error = %e, "Failed to update token counter");
                    }
                }
                Err(e) => {
                    tracing::error!(conversation_id, error = %e, "Failed to persist assistant message");
                }
            }

            if should_title {
                service.auto_title(conversation_id, &message).await;
            }

            yield ChatStreamEvent::done(conversation_id);
        }))
    }

    /// Everything that happens before the engine runs: resolve the project,
    /// get-or-create the conversation, persist the user message, load the
    /// prior-history window, and fetch document context.
    async fn prepare_turn(
        &self,
        request: &ChatRequest,
    ) -> Result<(TurnRequest, Conversation, MessageRecord)> {
        let project = self
            .store
            .find_project(request.project_id)?
            .ok_or(ChatError::ProjectNotFound(request.project_id))?;
        let conversation = self
            .store
            .get_or_create_conversation(project.id, request.conversation_id)?;

        // Persisted first, so the user's message survives any later failure.
        let user_tokens = estimate_tokens(&request.message) as i64;
        let user_message = self.store.insert_message(NewMessage {
            conversation_id: conversation.id,
            role: MessageRole::User,
            content: request.message.clone(),
            token_count: user_tokens,
        })?;

        let history: Vec<HistoryMessage> = self
            .store
            .recent_messages_before(conversation.id, user_message.id, self.config.history_limit)?
            .into_iter()
            .map(|m| HistoryMessage {
                role: match m.role {
                    MessageRole::User => Speaker::User,
                    MessageRole::Assistant => Speaker::Assistant,
                },
                content: m.content,
            })
            .collect();

        let document_context = match &self.retriever {
            Some(retriever) => {
                retriever
                    .get_context(project.id, &request.message, &request.document_ids)
                    .await
            }
            None => None,
        };

        let turn = TurnRequest {
            message: request.message.clone(),
            history,
            document_context,
            profile: ProjectProfile {
                id: project.id,
                name: project.name.clone(),
                system_prompt: project.system_prompt.clone(),
                enabled_tools: project.tools.clone(),
            },
            prefer_gpu: request.prefer_gpu,
            model: request.model.clone(),
        };

        Ok((turn, conversation, user_message))
    }

    /// Best-effort auto-titling after the first exchange. Never fails the
    /// turn: any model problem falls back to a prefix of the first message.
    async fn auto_title(&self, conversation_id: i64, first_message: &str) {
        let title = match self.generate_title(first_message).await {
            Ok(title) => title,
            Err(e) => {
                tracing::debug!(error = %e, "AI title generation failed, using fallback");
                truncate_chars(first_message, self.config.auto_title_max)
            }
        };

        match self.store.set_title_if_unset(conversation_id, &title) {
            Ok(true) => tracing::info!(conversation_id, %title, "Conversation titled"),
            Ok(false) => {}
            Err(e) => tracing::warn!(conversation_id, error = %e, "Failed to set title"),
        }
    }

    async fn generate_title(&self, first_message: &str) -> Result<String> {
        let prompt = format!(
            "Generate a short, concise 3-6 word title for a conversation that starts with: \
             '{}'. Reply with ONLY the title, no quotes or punctuation.",
            truncate_chars(first_message, 200)
        );

        match self.engine.backend().generate(GenerateRequest::new(prompt)).await? {
            ModelOutput::Text { content } => {
                let title = content.trim().trim_matches('"').trim_matches('\'').trim();
                if title.is_empty() {
                    return Err(ChatError::Model(sage_llm::LmError::InvalidResponse(
                        "empty title".to_string(),
                    )));
                }
                if title.chars().count() > TITLE_DISPLAY_MAX {
                    Ok(format!(
                        "{}...",
                        title
                            .chars()
                            .take(TITLE_DISPLAY_MAX - 3)
                            .collect::<String>()
                    ))
                } else {
                    Ok(title.to_string())
                }
            }
            ModelOutput::ToolCall(_) => Err(ChatError::Model(sage_llm::LmError::InvalidResponse(
                "tool call during title generation".to_string(),
            ))),
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
