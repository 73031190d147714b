//! System prompt composition and prompt assembly.
//!
//! The system prompt is layered: base behavioral rules, then tool-usage and
//! hallucination-prevention rules when tools are enabled (or no-tools
//! guidance when they are not), code formatting, completeness, response
//! style, and finally any project-specific instructions.

use crate::types::HistoryMessage;

const BASE_CORE_PROMPT: &str = "You are an AI study assistant specializing in educational \
support and research.

KNOWLEDGE LIMITATIONS:
- Current date: {current_date}
- You CANNOT browse the internet directly
- You CANNOT access URLs without using tools

DOCUMENT CONTEXT:
- If the user has uploaded documents, relevant excerpts are included in your context automatically
- When document context is provided, cite SPECIFIC content from the excerpts
- ONLY use information that appears in the provided excerpts, never training data
- If information is missing from the excerpts, say so explicitly";

const TOOL_USAGE_RULES: &str = "TOOL USAGE (CRITICAL):
- You have access to tools - use them immediately when needed
- For URLs, websites, companies, products: use web_search FIRST, then answer
- For current events, news, recent information: use web_search FIRST
- For complex math, large numbers, calculations: use calculator
- Do NOT say you lack access and do NOT ask permission - just use the tools

URL DETECTION = IMMEDIATE WEB SEARCH:
- Trigger web_search only when the user provides an actual URL or domain
  (http://, https://, www., or a standalone domain.tld)
- Do NOT search for generic words, file extensions, or questions about concepts
- If an actual URL is present: call web_search first, wait for results, then answer from them";

const HALLUCINATION_PREVENTION_RULES: &str = "HALLUCINATION PREVENTION:
- If uncertain about anything, use web_search instead of guessing
- For URLs and websites, NEVER rely on training data
- NEVER invent website features, company details, or product specifications";

const NO_TOOLS_GUIDANCE: &str = "KNOWLEDGE LIMITATIONS:
- You do not have access to web search or calculator tools
- Answer only from your training knowledge
- If you don't know something current or specific, admit it - don't guess
- Suggest users search externally for current information";

const CODE_FORMATTING_RULES: &str = "CODE FORMATTING:
- Always use fenced code blocks with a language tag (```python, ```rust, ...)
- Show complete, runnable examples with necessary imports
- Keep indentation consistent";

const COMPLETENESS_RULES: &str = "RESPONSE COMPLETENESS:
- Provide complete, thorough responses - never truncate
- Never use placeholders like '...' or 'TODO'
- Finish every section you begin; long responses are expected and correct";

const RESPONSE_STYLE_RULES: &str = "RESPONSE STYLE:
- Be direct and educational
- Cite sources when using web_search results
- For calculations, show your work
- Never start with hedging phrases or end by asking whether to continue";

/// Compose the full system prompt for a turn.
///
/// `project_prompt` (or the subject fallback) is appended last so
/// project-specific instructions can override the defaults.
pub fn compose_system_prompt(
    current_date: &str,
    project_prompt: Option<&str>,
    enabled_tools: &[String],
    subject: &str,
) -> String {
    let mut parts = vec![BASE_CORE_PROMPT.replace("{current_date}", current_date)];

    if enabled_tools.is_empty() {
        parts.push(NO_TOOLS_GUIDANCE.to_string());
    } else {
        parts.push(TOOL_USAGE_RULES.to_string());
        parts.push(HALLUCINATION_PREVENTION_RULES.to_string());
    }

    parts.push(CODE_FORMATTING_RULES.to_string());
    parts.push(COMPLETENESS_RULES.to_string());
    parts.push(RESPONSE_STYLE_RULES.to_string());

    match project_prompt {
        Some(prompt) if !prompt.trim().is_empty() => {
            parts.push(format!("PROJECT INSTRUCTIONS:\n{}", prompt));
        }
        _ => {
            parts.push(format!(
                "You are a helpful study assistant focused on {}.",
                subject
            ));
        }
    }

    parts.join("\n\n")
}

/// Assemble the prompt body: document context, prior turns, and the current
/// question. System instructions travel separately on the request.
pub fn build_prompt(
    message: &str,
    history: &[HistoryMessage],
    document_context: Option<&str>,
) -> String {
    let mut parts = Vec::new();

    if let Some(context) = document_context {
        parts.push(format!("Context from uploaded documents:\n{}", context));
    }

    if !history.is_empty() {
        let mut transcript = String::from("Previous conversation:");
        for message in history {
            transcript.push_str(&format!("\n{}: {}", message.role.label(), message.content));
        }
        parts.push(transcript);
    }

    parts.push(format!("Current question: {}\nAssistant:", message));

    parts.join("\n\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
