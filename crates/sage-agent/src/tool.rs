//! Tool framework: the [`Tool`] trait, the [`ToolInvocation`] record, and
//! the [`ToolRegistry`].
//!
//! The registry is an explicitly constructed value handed to the engine at
//! startup; there is no global instance. Dispatch never raises: unknown
//! tools and tool failures both come back as failed invocations so the
//! loop can feed the error text to the model and keep going.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use sage_llm::ToolSpec;

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for callable tools.
///
/// Each tool owns its own argument validation and sanitization; the
/// registry only routes by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool. Implementations should return failed invocations
    /// for expected problems; an `Err` is converted to one by the registry.
    async fn execute(&self, args: Value) -> Result<ToolInvocation>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Invocation
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one tool execution.
///
/// Transient: lives for a single loop iteration. The textual rendering is
/// folded into the next prompt; structured metadata survives only long
/// enough to feed side effects like the search archiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Name of the tool that ran.
    pub name: String,
    /// Arguments it ran with.
    pub arguments: Value,
    /// Whether execution succeeded.
    pub success: bool,
    /// Result text on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error text on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optional structured metadata (e.g. raw search hits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolInvocation {
    /// A successful invocation.
    pub fn ok(name: impl Into<String>, arguments: Value, result: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            success: true,
            result: Some(result.into()),
            error: None,
            metadata: None,
        }
    }

    /// A successful invocation carrying metadata.
    pub fn ok_with_metadata(
        name: impl Into<String>,
        arguments: Value,
        result: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::ok(name, arguments, result)
        }
    }

    /// A failed invocation.
    pub fn fail(name: impl Into<String>, arguments: Value, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            success: false,
            result: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    /// The text fed back into the prompt as this tool's result.
    pub fn text(&self) -> String {
        if self.success {
            self.result.clone().unwrap_or_default()
        } else {
            format!(
                "Error executing {}: {}",
                self.name,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry mapping tool names to executables.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register a tool from an `Arc`.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// True when a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True when no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Specs for the enabled subset, in the order requested.
    ///
    /// Names not matching a registered tool are silently skipped.
    pub fn specs(&self, enabled: &[String]) -> Vec<ToolSpec> {
        enabled
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec::new(tool.name(), tool.description(), tool.parameters()))
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// Never raises: an unknown name or a tool error becomes a failed
    /// invocation with the message as its error text.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolInvocation {
        let Some(tool) = self.get(name) else {
            return ToolInvocation::fail(name, args, format!("Tool '{}' not found", name));
        };

        match tool.execute(args.clone()).await {
            Ok(invocation) => invocation,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool execution failed");
                ToolInvocation::fail(name, args, e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Tool (for testing)
// ─────────────────────────────────────────────────────────────────────────────

/// A configurable tool for tests: scripted result, recorded calls.
#[cfg(test)]
pub struct MockTool {
    name: String,
    response: std::sync::Mutex<Option<ToolInvocation>>,
    calls: std::sync::Mutex<Vec<Value>>,
}

#[cfg(test)]
impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: std::sync::Mutex::new(None),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: ToolInvocation) -> Self {
        *self.response.lock().unwrap() = Some(response);
        self
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A mock tool for testing"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, args: Value) -> Result<ToolInvocation> {
        self.calls.lock().unwrap().push(args.clone());
        Ok(self
            .response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| ToolInvocation::ok(&self.name, args, "mock response")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
