//! Web search tool backed by a SearXNG metasearch instance.
//!
//! When the query itself embeds a domain, results are post-filtered to that
//! domain's public-suffix-aware registered domain (so `docs.zapagi.com`
//! still counts as `zapagi.com`). Filtering away every hit is still a
//! *successful* invocation with an explanatory message; silently returning
//! unrelated hits would be worse than returning none.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::Result;
use crate::tool::{Tool, ToolInvocation};

/// Configuration for the web search tool.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    /// Base URL of the SearXNG instance.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Hard cap on requested results.
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://searxng:8080".to_string(),
            timeout: Duration::from_secs(15),
            max_results: 15,
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub engine: String,
}

/// Web search tool.
pub struct WebSearchTool {
    client: reqwest::Client,
    config: WebSearchConfig,
}

impl WebSearchTool {
    /// Create a web search tool with default configuration.
    pub fn new() -> Self {
        Self::with_config(WebSearchConfig::default())
    }

    /// Create a web search tool with explicit configuration.
    pub fn with_config(config: WebSearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

const DEFAULT_NUM_RESULTS: usize = 5;

fn query_domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:https?://)?(?:www\.)?([a-zA-Z0-9-]+\.[a-zA-Z]{2,}(?:\.[a-zA-Z]{2,})?)")
            .expect("domain regex is valid")
    })
}

/// Coerce `num_results` to an integer; models sometimes send it as a
/// string. Defaults to 5, capped by configuration.
fn parse_num_results(args: &Value, cap: usize) -> usize {
    let requested = match args.get("num_results") {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        Some(Value::String(s)) => s.trim().parse::<usize>().ok(),
        _ => None,
    }
    .unwrap_or(DEFAULT_NUM_RESULTS);
    requested.min(cap)
}

/// If the query embeds a domain or URL, return its registered domain.
fn extract_target_domain(query: &str) -> Option<String> {
    let caps = query_domain_regex().captures(query)?;
    let host = caps.get(1)?.as_str();
    psl::domain_str(&host.to_lowercase()).map(|d| d.to_string())
}

/// Registered domain of a result URL, if it parses.
fn registered_domain_of_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    psl::domain_str(&host.to_lowercase()).map(|d| d.to_string())
}

/// Keep only hits whose registered domain matches the target.
fn filter_by_domain(hits: Vec<SearchHit>, target_domain: &str) -> Vec<SearchHit> {
    hits.into_iter()
        .filter(|hit| registered_domain_of_url(&hit.url).as_deref() == Some(target_domain))
        .collect()
}

/// Render hits as the numbered text block the model reads.
fn format_results(query: &str, hits: &[SearchHit]) -> String {
    let mut text = format!("Search results for '{}':\n\n", query);
    for (i, hit) in hits.iter().enumerate() {
        let snippet: String = hit.snippet.chars().take(200).collect();
        let ellipsis = if hit.snippet.chars().count() > 200 {
            "..."
        } else {
            ""
        };
        text.push_str(&format!(
            "{}. {}\n   {}{}\n   URL: {}\n   Source: {}\n\n",
            i + 1,
            hit.title,
            snippet,
            ellipsis,
            hit.url,
            hit.engine
        ));
    }
    text.trim_end().to_string()
}

fn parse_hits(data: &Value) -> Vec<SearchHit> {
    data.get("results")
        .and_then(|r| r.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| SearchHit {
                    title: item
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or("No title")
                        .to_string(),
                    snippet: item
                        .get("content")
                        .or_else(|| item.get("snippet"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("No description available")
                        .to_string(),
                    url: item
                        .get("url")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    engine: item
                        .get("engine")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for information using multiple search engines. Returns relevant \
         results with titles, snippets, and URLs. Use this when you need current information, \
         facts, research, or want to find resources online."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query to look up on the web"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default: 5, max: 15)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolInvocation> {
        let Some(query) = args.get("query").and_then(|v| v.as_str()).map(String::from) else {
            return Ok(ToolInvocation::fail(
                self.name(),
                args,
                "Missing 'query' parameter",
            ));
        };

        let num_results = parse_num_results(&args, self.config.max_results);
        let target_domain = extract_target_domain(&query);

        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let response = match self
            .client
            .get(&url)
            .query(&[("q", query.as_str()), ("format", "json"), ("language", "en")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Ok(ToolInvocation::fail(
                    self.name(),
                    args,
                    format!("Network error during search: {}", e),
                ));
            }
        };

        if !response.status().is_success() {
            return Ok(ToolInvocation::fail(
                self.name(),
                args,
                format!("Search service returned status {}", response.status()),
            ));
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                return Ok(ToolInvocation::fail(
                    self.name(),
                    args,
                    format!("Search error: {}", e),
                ));
            }
        };

        let mut hits = parse_hits(&data);

        if hits.is_empty() {
            return Ok(ToolInvocation::ok_with_metadata(
                self.name(),
                args,
                "No results found for this query. Try rephrasing your search.",
                json!({"query": query, "num_results": 0}),
            ));
        }

        if let Some(ref domain) = target_domain {
            let original_count = hits.len();
            hits = filter_by_domain(hits, domain);

            if hits.is_empty() {
                return Ok(ToolInvocation::ok_with_metadata(
                    self.name(),
                    args,
                    format!(
                        "No reliable information found for {}. The search returned {} results \
                         but none were from the target domain.",
                        domain, original_count
                    ),
                    json!({
                        "query": query,
                        "target_domain": domain,
                        "num_results": 0,
                        "filtered": true,
                        "original_count": original_count,
                    }),
                ));
            }
        }

        hits.truncate(num_results);
        let text = format_results(&query, &hits);

        let mut metadata = json!({
            "query": query,
            "num_results": hits.len(),
            "results": hits,
            "search_engine": "SearXNG",
        });
        if let Some(domain) = target_domain {
            metadata["filtered_by_domain"] = json!(domain);
        }

        Ok(ToolInvocation::ok_with_metadata(
            self.name(),
            args,
            text,
            metadata,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            title: "Title".to_string(),
            snippet: "Snippet".to_string(),
            url: url.to_string(),
            engine: "test".to_string(),
        }
    }

    #[test]
    fn test_parse_num_results_coercion() {
        assert_eq!(parse_num_results(&json!({"num_results": 3}), 15), 3);
        assert_eq!(parse_num_results(&json!({"num_results": "7"}), 15), 7);
        assert_eq!(parse_num_results(&json!({"num_results": "junk"}), 15), 5);
        assert_eq!(parse_num_results(&json!({}), 15), 5);
        // Capped.
        assert_eq!(parse_num_results(&json!({"num_results": 50}), 15), 15);
    }

    #[test]
    fn test_extract_target_domain() {
        assert_eq!(
            extract_target_domain("what is zapagi.com").as_deref(),
            Some("zapagi.com")
        );
        assert_eq!(
            extract_target_domain("https://www.zapagi.com/about").as_deref(),
            Some("zapagi.com")
        );
        assert_eq!(extract_target_domain("rust async tutorials"), None);
    }

    #[test]
    fn test_filter_by_domain_keeps_matching() {
        let hits = vec![hit("https://zapagi.com/x"), hit("https://other.com/y")];
        let filtered = filter_by_domain(hits, "zapagi.com");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].url, "https://zapagi.com/x");
    }

    #[test]
    fn test_filter_by_domain_subdomain_matches() {
        let hits = vec![hit("https://docs.zapagi.com/guide")];
        let filtered = filter_by_domain(hits, "zapagi.com");
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_filter_by_domain_empty_when_nothing_matches() {
        let hits = vec![hit("https://other.com/y")];
        assert!(filter_by_domain(hits, "zapagi.com").is_empty());
    }

    #[test]
    fn test_format_results_numbering_and_truncation() {
        let mut long = hit("https://a.com");
        long.snippet = "s".repeat(300);
        let text = format_results("query", &[long, hit("https://b.com")]);

        assert!(text.starts_with("Search results for 'query':"));
        assert!(text.contains("1. Title"));
        assert!(text.contains("2. Title"));
        assert!(text.contains(&format!("{}...", "s".repeat(200))));
        assert!(text.contains("URL: https://b.com"));
    }

    #[test]
    fn test_parse_hits_field_fallbacks() {
        let data = json!({"results": [
            {"title": "A", "content": "c", "url": "https://a.com", "engine": "google"},
            {"url": "https://b.com"},
        ]});
        let hits = parse_hits(&data);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "c");
        assert_eq!(hits[1].title, "No title");
        assert_eq!(hits[1].engine, "unknown");
    }
}
