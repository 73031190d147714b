//! Ollama backend.
//!
//! Talks to an Ollama server's `/api/chat` endpoint. Tool schemas go out in
//! the OpenAI function-calling shape; the GPU toggle maps to Ollama's
//! `num_gpu` option (999 to use the GPU, 0 to pin the model to CPU —
//! Ollama keeps the last value, so it must be sent explicitly every call).

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::time::Duration;

use crate::backend::{LmBackend, ModelStream};
use crate::error::{LmError, Result};
use crate::types::{GenerateRequest, ModelOutput, StreamEvent, ToolCallRequest};

/// Configuration for the Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Default model when the request does not override it.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            temperature: 0.7,
        }
    }
}

/// Model backend backed by a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    /// Create a backend with the given configuration.
    ///
    /// The HTTP client carries no overall timeout of its own; the per-call
    /// timeout comes from each [`GenerateRequest`].
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LmError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url.trim_end_matches('/'))
    }

    fn build_payload(&self, request: &GenerateRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let num_gpu = if request.prefer_gpu { 999 } else { 0 };

        let mut payload = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
            "options": {
                "num_gpu": num_gpu,
                "temperature": self.config.temperature,
            }
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| t.to_function_schema())
                .collect();
            payload["tools"] = json!(tools);
        }

        payload
    }
}

/// Extract the first tool call from an Ollama `message` object, if any.
fn parse_tool_call(message: &Value) -> Option<ToolCallRequest> {
    let call = message.get("tool_calls")?.as_array()?.first()?;
    let function = call.get("function")?;
    let name = function.get("name")?.as_str()?.to_string();
    let arguments = function
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));
    Some(ToolCallRequest {
        name,
        arguments,
        call_id: call
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    })
}

fn parse_message(data: &Value) -> Result<ModelOutput> {
    let message = data
        .get("message")
        .ok_or_else(|| LmError::InvalidResponse("missing 'message' field".to_string()))?;

    if let Some(call) = parse_tool_call(message) {
        return Ok(ModelOutput::ToolCall(call));
    }

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LmError::InvalidResponse("missing 'message.content'".to_string()))?;
    Ok(ModelOutput::text(content))
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| LmError::Timeout(timeout.as_secs()))?
}

#[async_trait]
impl LmBackend for OllamaBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelOutput> {
        let payload = self.build_payload(&request, false);
        let url = self.chat_url();

        tracing::debug!(
            model = %payload["model"],
            tools = request.tools.len(),
            prefer_gpu = request.prefer_gpu,
            timeout_secs = request.timeout.as_secs(),
            "Ollama: generate"
        );

        let data: Value = with_timeout(request.timeout, async {
            let response = self.client.post(&url).json(&payload).send().await?;
            if !response.status().is_success() {
                return Err(LmError::Provider(format!(
                    "Ollama returned status {}",
                    response.status()
                )));
            }
            Ok(response.json().await?)
        })
        .await?;

        parse_message(&data)
    }

    async fn generate_stream(&self, request: GenerateRequest) -> Result<ModelStream> {
        let payload = self.build_payload(&request, true);
        let url = self.chat_url();
        let timeout = request.timeout;

        let response = with_timeout(timeout, async {
            let response = self.client.post(&url).json(&payload).send().await?;
            if !response.status().is_success() {
                return Err(LmError::Provider(format!(
                    "Ollama returned status {}",
                    response.status()
                )));
            }
            Ok(response)
        })
        .await?;

        let mut bytes = response.bytes_stream();

        Ok(Box::pin(async_stream::stream! {
            let mut buffer = String::new();
            loop {
                let chunk = match tokio::time::timeout(timeout, bytes.next()).await {
                    Err(_) => {
                        yield Ok(StreamEvent::error(format!(
                            "model call timed out after {} seconds",
                            timeout.as_secs()
                        )));
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        yield Ok(StreamEvent::error(e.to_string()));
                        return;
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Ollama streams newline-delimited JSON objects.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }

                    let data: Value = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(e) => {
                            yield Ok(StreamEvent::error(format!("malformed stream line: {}", e)));
                            return;
                        }
                    };

                    if let Some(err) = data.get("error").and_then(|v| v.as_str()) {
                        yield Ok(StreamEvent::error(err.to_string()));
                        return;
                    }

                    if let Some(message) = data.get("message") {
                        if let Some(call) = parse_tool_call(message) {
                            yield Ok(StreamEvent::ToolCall(call));
                            return;
                        }
                        if let Some(content) = message.get("content").and_then(|v| v.as_str()) {
                            if !content.is_empty() {
                                yield Ok(StreamEvent::token(content));
                            }
                        }
                    }

                    if data.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
                        return;
                    }
                }
            }
        }))
    }

    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LmError::Provider(format!(
                "Ollama health check returned {}",
                response.status()
            )))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
