//! The agentic loop engine.
//!
//! One turn runs: classify → (forced web search for URL-shaped queries) →
//! model call ⇄ tool call → final answer, bounded by a hard iteration cap.
//! The buffered and streaming variants share the same decision semantics;
//! streaming additionally emits status events around tool executions and
//! surfaces model failures as a terminal error event instead of raising.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;

use sage_llm::{GenerateRequest, ModelOutput, SharedBackend, StreamEvent, ToolSpec};

use crate::classify::{QueryType, ToolRequirement, classify, extract_url_or_domain};
use crate::error::Result;
use crate::hallucination::{detect_risk, prepend_warning};
use crate::prompt::{build_prompt, compose_system_prompt};
use crate::tool::{ToolInvocation, ToolRegistry};
use crate::types::{SearchArchiveRequest, TurnRequest};

/// Returned when the iteration cap is reached without a text answer.
pub const MAX_ITERATIONS_APOLOGY: &str = "I apologize, but I reached the maximum number of \
steps while processing your request. Please try rephrasing your question.";

/// Display budget for tool-result previews in status events. The text fed
/// back into the prompt is never truncated.
const TOOL_PREVIEW_CHARS: usize = 200;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the loop engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default model; a turn may override it.
    pub model: Option<String>,
    /// Hard cap on model-call/tool-call round trips per turn.
    pub max_iterations: u32,
    /// Per-call model timeout.
    pub request_timeout: Duration,
    /// Result count requested by a forced search.
    pub forced_search_results: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_iterations: 5,
            request_timeout: Duration::from_secs(120),
            forced_search_results: 5,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Events
// ─────────────────────────────────────────────────────────────────────────────

/// Events emitted by the streaming variant of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A fragment of the final answer.
    Token { content: String },
    /// A tool is about to run.
    ToolExecution { tool: String, arguments: Value },
    /// A tool finished; `preview` is truncated for display.
    ToolResult {
        tool: String,
        success: bool,
        preview: String,
    },
    /// A hallucination-risk disclaimer for the streamed answer.
    Warning { content: String },
    /// Terminal failure; the stream ends after this.
    Error { message: String },
}

/// A lazy, single-pass, non-restartable sequence of turn events.
pub type ChatStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Drives the iterative model-call/tool-call cycle for one turn at a time.
pub struct ChatEngine {
    backend: SharedBackend,
    tools: Arc<ToolRegistry>,
    config: EngineConfig,
    archive_tx: Option<UnboundedSender<SearchArchiveRequest>>,
}

impl ChatEngine {
    /// Create an engine over the given backend and tool registry.
    pub fn new(backend: SharedBackend, tools: ToolRegistry, config: EngineConfig) -> Self {
        Self {
            backend,
            tools: Arc::new(tools),
            config,
            archive_tx: None,
        }
    }

    /// Attach the channel that receives search-archive requests.
    pub fn with_archive_channel(mut self, tx: UnboundedSender<SearchArchiveRequest>) -> Self {
        self.archive_tx = Some(tx);
        self
    }

    /// The model backend.
    pub fn backend(&self) -> SharedBackend {
        self.backend.clone()
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one turn to completion and return the final answer text.
    pub async fn run(&self, turn: &TurnRequest) -> Result<String> {
        let tool_specs = self.tools.specs(&turn.profile.enabled_tools);
        let mut tools_used: HashSet<String> = HashSet::new();
        let mut document_context = turn.document_context.clone();
        let mut project_prompt = turn.profile.system_prompt.clone();
        let mut forced = false;

        if let Some(target) = forced_search_target(turn) {
            tracing::info!(%target, "URL detected, forcing web search before model call");
            let args = json!({
                "query": target,
                "num_results": self.config.forced_search_results,
            });
            let invocation = self.tools.dispatch("web_search", args).await;
            tools_used.insert("web_search".to_string());

            if invocation.success {
                apply_forced_search(
                    &target,
                    &invocation,
                    &mut document_context,
                    &mut project_prompt,
                );
                enqueue_archive(&self.archive_tx, turn.profile.id, &target, &invocation);
                forced = true;
            } else {
                tracing::warn!(error = ?invocation.error, "Forced search failed, continuing without results");
            }
        }

        let system_prompt = compose_system_prompt(
            &current_date(),
            project_prompt.as_deref(),
            &turn.profile.enabled_tools,
            &turn.profile.name,
        );
        let mut prompt = build_prompt(&turn.message, &turn.history, document_context.as_deref());

        if forced {
            // The forced search already settled the tool question; go
            // straight to the final answer with tool schemas omitted.
            let request = make_request(&prompt, &system_prompt, turn, Vec::new(), &self.config);
            return match self.backend.generate(request).await? {
                ModelOutput::Text { content } => {
                    Ok(screen_response(&turn.message, content, &tools_used))
                }
                ModelOutput::ToolCall(call) => Err(sage_llm::LmError::InvalidResponse(format!(
                    "backend requested tool '{}' when no tools were offered",
                    call.name
                ))
                .into()),
            };
        }

        for iteration in 1..=self.config.max_iterations {
            tracing::info!(
                iteration,
                max_iterations = self.config.max_iterations,
                "Tool loop iteration"
            );

            let request = make_request(
                &prompt,
                &system_prompt,
                turn,
                tool_specs.clone(),
                &self.config,
            );
            match self.backend.generate(request).await? {
                ModelOutput::ToolCall(call) => {
                    let call_id = call.id();
                    tracing::info!(tool = %call.name, %call_id, "Tool call requested");
                    tools_used.insert(call.name.clone());

                    let invocation = self.tools.dispatch(&call.name, call.arguments).await;
                    if call.name == "web_search" && invocation.success {
                        enqueue_archive(
                            &self.archive_tx,
                            turn.profile.id,
                            &turn.message,
                            &invocation,
                        );
                    }
                    push_tool_result(&mut prompt, &call.name, &invocation);
                }
                ModelOutput::Text { content } => {
                    tracing::info!(iteration, "Final response generated");
                    return Ok(screen_response(&turn.message, content, &tools_used));
                }
            }
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            "Max iterations reached in tool loop"
        );
        Ok(MAX_ITERATIONS_APOLOGY.to_string())
    }

    /// Run one turn as a stream of events.
    ///
    /// Tool-decision calls use the non-streaming model entry point; only
    /// the final, tool-free answer is streamed token by token.
    pub fn run_stream(&self, turn: TurnRequest) -> ChatStream {
        let backend = self.backend.clone();
        let tools = self.tools.clone();
        let config = self.config.clone();
        let archive_tx = self.archive_tx.clone();

        Box::pin(async_stream::stream! {
            let tool_specs = tools.specs(&turn.profile.enabled_tools);
            let mut tools_used: HashSet<String> = HashSet::new();
            let mut document_context = turn.document_context.clone();
            let mut project_prompt = turn.profile.system_prompt.clone();
            let mut forced = false;

            if let Some(target) = forced_search_target(&turn) {
                tracing::info!(%target, "URL detected, forcing web search before model call");
                let args = json!({
                    "query": target,
                    "num_results": config.forced_search_results,
                });
                yield ChatEvent::ToolExecution {
                    tool: "web_search".to_string(),
                    arguments: args.clone(),
                };

                let invocation = tools.dispatch("web_search", args).await;
                tools_used.insert("web_search".to_string());
                yield ChatEvent::ToolResult {
                    tool: "web_search".to_string(),
                    success: invocation.success,
                    preview: truncate_preview(&invocation.text()),
                };

                if invocation.success {
                    apply_forced_search(
                        &target,
                        &invocation,
                        &mut document_context,
                        &mut project_prompt,
                    );
                    enqueue_archive(&archive_tx, turn.profile.id, &target, &invocation);
                    forced = true;
                } else {
                    tracing::warn!(error = ?invocation.error, "Forced search failed, continuing without results");
                }
            }

            let system_prompt = compose_system_prompt(
                &current_date(),
                project_prompt.as_deref(),
                &turn.profile.enabled_tools,
                &turn.profile.name,
            );
            let mut prompt = build_prompt(&turn.message, &turn.history, document_context.as_deref());

            let mut iteration = 0u32;
            loop {
                // With no tools enabled there is no decision to make; a
                // successful forced search settles it for the whole turn.
                if !forced && !tool_specs.is_empty() {
                    iteration += 1;
                    if iteration > config.max_iterations {
                        tracing::warn!(
                            max_iterations = config.max_iterations,
                            "Max iterations reached in tool loop"
                        );
                        yield ChatEvent::Token { content: MAX_ITERATIONS_APOLOGY.to_string() };
                        return;
                    }
                    tracing::info!(iteration, max_iterations = config.max_iterations, "Tool loop iteration");

                    // Non-streaming decision call: cheap to discard when it
                    // turns out to be a tool invocation.
                    let request = make_request(&prompt, &system_prompt, &turn, tool_specs.clone(), &config);
                    let output = match backend.generate(request).await {
                        Ok(output) => output,
                        Err(e) => {
                            tracing::error!(error = %e, "Model call failed");
                            yield ChatEvent::Error { message: e.to_string() };
                            return;
                        }
                    };

                    if let ModelOutput::ToolCall(call) = output {
                        let call_id = call.id();
                        tracing::info!(tool = %call.name, %call_id, "Tool call requested");
                        tools_used.insert(call.name.clone());
                        yield ChatEvent::ToolExecution {
                            tool: call.name.clone(),
                            arguments: call.arguments.clone(),
                        };

                        let invocation = tools.dispatch(&call.name, call.arguments).await;
                        if call.name == "web_search" && invocation.success {
                            enqueue_archive(&archive_tx, turn.profile.id, &turn.message, &invocation);
                        }
                        yield ChatEvent::ToolResult {
                            tool: call.name.clone(),
                            success: invocation.success,
                            preview: truncate_preview(&invocation.text()),
                        };
                        push_tool_result(&mut prompt, &call.name, &invocation);
                        continue;
                    }
                    // Text decision: the model is done with tools. Discard it
                    // and stream the real answer below.
                }

                let request = make_request(&prompt, &system_prompt, &turn, Vec::new(), &config);
                let mut model_stream = match backend.generate_stream(request).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::error!(error = %e, "Model stream failed to start");
                        yield ChatEvent::Error { message: e.to_string() };
                        return;
                    }
                };

                let mut full_response = String::new();
                while let Some(item) = model_stream.next().await {
                    match item {
                        Ok(StreamEvent::Token { content }) => {
                            full_response.push_str(&content);
                            yield ChatEvent::Token { content };
                        }
                        Ok(StreamEvent::ToolCall(call)) => {
                            // No tools were offered on this call.
                            tracing::warn!(tool = %call.name, "Ignoring tool call in final answer stream");
                        }
                        Ok(StreamEvent::Error { message }) => {
                            tracing::error!(%message, "Model stream error");
                            yield ChatEvent::Error { message };
                            return;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Model stream error");
                            yield ChatEvent::Error { message: e.to_string() };
                            return;
                        }
                    }
                }

                if let Some(warning) = detect_risk(&turn.message, &full_response, &tools_used) {
                    tracing::warn!("Hallucination risk detected, emitting warning");
                    yield ChatEvent::Warning { content: warning };
                }
                return;
            }
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Decide whether this turn must open with a forced web search, and with
/// what query.
fn forced_search_target(turn: &TurnRequest) -> Option<String> {
    let (query_type, requirement) = classify(&turn.message);
    tracing::info!(query_type = ?query_type, requirement = ?requirement, "Query classified");

    (query_type == QueryType::UrlLookup
        && requirement == ToolRequirement::Required
        && turn.profile.has_tool("web_search"))
    .then(|| extract_url_or_domain(&turn.message))
}

/// Fold a successful forced search into the turn state: prepend the result
/// block to the document context and harden the project prompt.
fn apply_forced_search(
    target: &str,
    invocation: &ToolInvocation,
    document_context: &mut Option<String>,
    project_prompt: &mut Option<String>,
) {
    let block = format!(
        "\n\n=== WEB SEARCH RESULTS FOR {} ===\n{}\n=== END SEARCH RESULTS ===\n",
        target,
        invocation.text()
    );
    let existing = document_context.take().unwrap_or_default();
    *document_context = Some(format!("{}{}", block, existing));

    let base = project_prompt.take().unwrap_or_default();
    *project_prompt = Some(format!(
        "{}\n\nCRITICAL INSTRUCTION: The user asked about a URL/website ({}). Current web \
         search results have been provided above in the context. You MUST base your answer \
         ONLY on these search results. DO NOT add information from your training data. If \
         the search results don't contain enough information, say so explicitly.",
        base, target
    ));
}

/// Append a tool result to the prompt as a labeled continuation.
fn push_tool_result(prompt: &mut String, tool_name: &str, invocation: &ToolInvocation) {
    let continuation = if tool_name == "web_search" {
        "IMPORTANT: In your response, cite the URLs from the search results. Format each \
         source as a markdown link: [Title](URL). Provide a comprehensive answer with \
         clickable source links."
    } else {
        "Based on this information, provide your response to the user:"
    };
    prompt.push_str(&format!(
        "\n\nTool {} returned: {}\n\n{}",
        tool_name,
        invocation.text(),
        continuation
    ));
}

/// Run hallucination screening over the final answer.
fn screen_response(message: &str, response: String, tools_used: &HashSet<String>) -> String {
    match detect_risk(message, &response, tools_used) {
        Some(warning) => {
            tracing::warn!("Hallucination risk detected, prepending warning");
            prepend_warning(&response, &warning)
        }
        None => response,
    }
}

fn make_request(
    prompt: &str,
    system_prompt: &str,
    turn: &TurnRequest,
    tool_specs: Vec<ToolSpec>,
    config: &EngineConfig,
) -> GenerateRequest {
    let mut request = GenerateRequest::new(prompt)
        .with_system(system_prompt)
        .with_prefer_gpu(turn.prefer_gpu)
        .with_timeout(config.request_timeout);

    if let Some(model) = turn.model.clone().or_else(|| config.model.clone()) {
        request = request.with_model(model);
    }
    if !tool_specs.is_empty() {
        request = request.with_tools(tool_specs);
    }
    request
}

/// Enqueue successful web-search results for archiving. Best-effort: a
/// missing channel, missing metadata, or closed receiver is silently fine.
fn enqueue_archive(
    tx: &Option<UnboundedSender<SearchArchiveRequest>>,
    project_id: i64,
    fallback_query: &str,
    invocation: &ToolInvocation,
) {
    let Some(tx) = tx else { return };
    let Some(metadata) = &invocation.metadata else {
        return;
    };
    let Some(results) = metadata.get("results").and_then(|r| r.as_array()) else {
        return;
    };
    if results.is_empty() {
        return;
    }

    let query = metadata
        .get("query")
        .and_then(|q| q.as_str())
        .unwrap_or(fallback_query)
        .to_string();

    let _ = tx.send(SearchArchiveRequest {
        project_id,
        query,
        results: results.clone(),
    });
}

fn current_date() -> String {
    Utc::now().format("%B %d, %Y").to_string()
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= TOOL_PREVIEW_CHARS {
        text.to_string()
    } else {
        text.chars().take(TOOL_PREVIEW_CHARS).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
