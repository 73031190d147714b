//! Query classification: which category a message falls into and how
//! strongly it calls for a tool.
//!
//! Everything here is a pure, total function over the message string. The
//! result drives logging and the forced-search override in the engine; it
//! never forbids the model from calling other tools.

use chrono::{Datelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Query categories, first match wins in [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// The message contains a URL or bare domain.
    UrlLookup,
    /// The message explicitly asks to search.
    WebSearchRequired,
    /// The message asks about recent or current information.
    CurrentEvents,
    /// The message asks for arithmetic.
    Calculation,
    /// Creative writing; tools would get in the way.
    Creative,
    /// Everything else.
    GeneralKnowledge,
}

/// How strongly the category calls for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRequirement {
    Required,
    Recommended,
    Optional,
    None,
}

/// TLDs recognized in bare `word.tld` tokens.
const DOMAIN_TLDS: &[&str] = &[
    "com", "org", "net", "io", "ai", "dev", "co", "me", "info", "app", "edu", "gov", "tech",
    "xyz", "site", "online", "ly",
];

/// Ordinary English words that collide with the bare-domain pattern.
///
/// Prose with a missing space after a sentence-final period produces tokens
/// like "daily.Online" that the regex would otherwise read as a domain, and
/// stylized writing splits adverbs as "final.ly". A match is rejected when
/// its pre-dot label, or the label and TLD joined back together, is one of
/// these words.
const DOMAIN_WORD_DENYLIST: &[&str] = &[
    "already", "finally", "nearly", "really", "family", "daily", "early", "likely", "only",
    "simply", "quickly", "usually", "probably", "exactly",
];

fn bare_domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let tlds = DOMAIN_TLDS.join("|");
        Regex::new(&format!(
            r"(?i)\b([a-z0-9-]+(?:\.[a-z0-9-]+)?)\.({})\b",
            tlds
        ))
        .expect("bare domain regex is valid")
    })
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)https?://([^\s]+)").expect("url regex is valid"))
}

fn www_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bwww\.([^\s]+)").expect("www regex is valid"))
}

fn calc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\s*[-+*/^]\s*\d+").expect("calc regex is valid"))
}

/// Find the first bare `word.tld` match that survives the denylist.
fn find_bare_domain(message: &str) -> Option<String> {
    for caps in bare_domain_regex().captures_iter(message) {
        let full = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let label = name.rsplit('.').next().unwrap_or(name).to_lowercase();
        let joined = full.replace('.', "").to_lowercase();

        if DOMAIN_WORD_DENYLIST.contains(&label.as_str())
            || DOMAIN_WORD_DENYLIST.contains(&joined.as_str())
        {
            continue;
        }
        return Some(full.to_string());
    }
    None
}

/// True when the message contains a URL, a `www.` host, or a bare domain.
pub fn detect_url_patterns(message: &str) -> bool {
    url_regex().is_match(message)
        || www_regex().is_match(message)
        || find_bare_domain(message).is_some()
}

/// Extract the primary URL or domain for use as a search query.
///
/// Returns the first full URL stripped of its scheme and trailing slash,
/// else the first `www.`-prefixed host (minus the prefix), else the first
/// bare domain, else the message unchanged.
pub fn extract_url_or_domain(message: &str) -> String {
    if let Some(caps) = url_regex().captures(message) {
        return caps[1].trim_end_matches('/').to_string();
    }
    if let Some(caps) = www_regex().captures(message) {
        return caps[1].trim_end_matches('/').to_string();
    }
    if let Some(domain) = find_bare_domain(message) {
        return domain;
    }
    message.to_string()
}

/// Year tokens treated as recency signals: previous, current, and next year.
pub fn recent_year_tokens() -> [String; 3] {
    let year = Utc::now().year();
    [
        (year - 1).to_string(),
        year.to_string(),
        (year + 1).to_string(),
    ]
}

const SEARCH_PHRASES: &[&str] = &[
    "search for",
    "look up",
    "find information about",
    "what is the latest",
    "recent news",
    "tell me about the website",
    "information about",
];

const CURRENT_EVENT_INDICATORS: &[&str] = &[
    "latest",
    "recent",
    "current",
    "today",
    "this week",
    "this month",
    "now",
    "currently",
];

const CALC_WORDS: &[&str] = &["calculate", "compute", "solve"];

const CREATIVE_INDICATORS: &[&str] = &[
    "write a story",
    "create a poem",
    "imagine",
    "make up",
    "brainstorm",
    "creative writing",
];

/// Classify a user message. Pure and total: any string input, including
/// empty or pathological ones, maps to a defined category.
pub fn classify(message: &str) -> (QueryType, ToolRequirement) {
    let lower = message.to_lowercase();

    // URL/domain detection wins over everything.
    if detect_url_patterns(message) {
        return (QueryType::UrlLookup, ToolRequirement::Required);
    }

    if SEARCH_PHRASES.iter().any(|p| lower.contains(p)) {
        return (QueryType::WebSearchRequired, ToolRequirement::Required);
    }

    let years = recent_year_tokens();
    if CURRENT_EVENT_INDICATORS.iter().any(|p| lower.contains(p))
        || years.iter().any(|y| lower.contains(y.as_str()))
    {
        return (QueryType::CurrentEvents, ToolRequirement::Recommended);
    }

    if calc_regex().is_match(&lower) || CALC_WORDS.iter().any(|w| lower.contains(w)) {
        return (QueryType::Calculation, ToolRequirement::Required);
    }

    if CREATIVE_INDICATORS.iter().any(|p| lower.contains(p)) {
        return (QueryType::Creative, ToolRequirement::None);
    }

    (QueryType::GeneralKnowledge, ToolRequirement::Optional)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url_classifies_as_url_lookup() {
        let (qt, req) = classify("can you tell me about https://react.dev");
        assert_eq!(qt, QueryType::UrlLookup);
        assert_eq!(req, ToolRequirement::Required);
    }

    #[test]
    fn test_bare_domain_classifies_as_url_lookup() {
        let (qt, req) = classify("check out zapagi.com");
        assert_eq!(qt, QueryType::UrlLookup);
        assert_eq!(req, ToolRequirement::Required);
    }

    #[test]
    fn test_www_prefix_classifies_as_url_lookup() {
        let (qt, _) = classify("what is on www.example.org today");
        assert_eq!(qt, QueryType::UrlLookup);
    }

    #[test]
    fn test_denylisted_common_word_does_not_trigger() {
        // Adverb only; no domain-shaped token at all.
        let (qt, _) = classify("I'll call you later, finally");
        assert_ne!(qt, QueryType::UrlLookup);

        // Missing space after a sentence-final period.
        let (qt, _) = classify("I check the report daily.Online access is disabled anyway");
        assert_ne!(qt, QueryType::UrlLookup);

        // Stylized adverb split.
        assert!(!detect_url_patterns("that was final.ly settled"));
    }

    #[test]
    fn test_denylist_does_not_block_real_domains() {
        assert!(detect_url_patterns("my notes are on dailybrief.online"));
        assert!(detect_url_patterns("see zapagi.ly"));
    }

    #[test]
    fn test_search_phrase() {
        let (qt, req) = classify("please search for rust async tutorials");
        assert_eq!(qt, QueryType::WebSearchRequired);
        assert_eq!(req, ToolRequirement::Required);
    }

    #[test]
    fn test_current_events() {
        let (qt, req) = classify("anything interesting happen today?");
        assert_eq!(qt, QueryType::CurrentEvents);
        assert_eq!(req, ToolRequirement::Recommended);
    }

    #[test]
    fn test_year_token_counts_as_current_events() {
        let year = Utc::now().year();
        let (qt, _) = classify(&format!("what happened in {}", year));
        assert_eq!(qt, QueryType::CurrentEvents);
    }

    #[test]
    fn test_calculation_patterns() {
        let (qt, req) = classify("what is 12 * 7?");
        assert_eq!(qt, QueryType::Calculation);
        assert_eq!(req, ToolRequirement::Required);

        let (qt, _) = classify("solve this equation for me");
        assert_eq!(qt, QueryType::Calculation);
    }

    #[test]
    fn test_creative() {
        let (qt, req) = classify("write a story about a dragon");
        assert_eq!(qt, QueryType::Creative);
        assert_eq!(req, ToolRequirement::None);
    }

    #[test]
    fn test_default_general_knowledge() {
        let (qt, req) = classify("why is the sky blue?");
        assert_eq!(qt, QueryType::GeneralKnowledge);
        assert_eq!(req, ToolRequirement::Optional);
    }

    #[test]
    fn test_classification_is_total() {
        // Must never panic, whatever the input.
        classify("");
        classify("   ");
        classify("🦀🦀🦀 ünïcödé ブスト");
        classify(&"a.".repeat(10_000));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let message = "check out zapagi.com";
        assert_eq!(classify(message), classify(message));
    }

    #[test]
    fn test_extract_full_url() {
        assert_eq!(
            extract_url_or_domain("visit https://react.dev/learn"),
            "react.dev/learn"
        );
        assert_eq!(
            extract_url_or_domain("see https://example.org/"),
            "example.org"
        );
    }

    #[test]
    fn test_extract_www_host() {
        assert_eq!(
            extract_url_or_domain("go to www.example.com please"),
            "example.com"
        );
    }

    #[test]
    fn test_extract_bare_domain() {
        assert_eq!(extract_url_or_domain("check zapagi.com"), "zapagi.com");
        assert_eq!(
            extract_url_or_domain("docs at api.zapagi.com maybe"),
            "api.zapagi.com"
        );
    }

    #[test]
    fn test_extract_identity_when_no_match() {
        let message = "tell me about owls";
        assert_eq!(extract_url_or_domain(message), message);
    }
}
