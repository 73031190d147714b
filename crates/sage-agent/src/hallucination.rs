//! Hallucination risk screening for final answers.
//!
//! The rules are ordered and the first match wins; they are not
//! cumulative. A warning is advisory text prepended to the answer, never a
//! mutation of persisted state.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::classify::{detect_url_patterns, recent_year_tokens};

const RECENCY_KEYWORDS: &[&str] = &["latest", "recent", "current"];

/// Phrasings that read as confident, specific claims about an entity.
const SPECIFIC_CLAIM_PATTERNS: &[&str] = &[
    r"is a (company|product|service|platform|website) (that|which)",
    r"offers the following (features|services|products)",
    r"was founded (in|by)",
    r"is based in",
    r"provides \d+ (features|services|tools)",
];

fn claim_regexes() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        SPECIFIC_CLAIM_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("claim pattern is valid"))
            .collect()
    })
}

const URL_WARNING: &str = "⚠️ **Note:** This response was generated without researching \
the mentioned website. For accurate information, please ask me to search for it.";

const RECENCY_WARNING: &str = "⚠️ **Note:** This response is based on training data and may \
not reflect the most current information. For the latest details, please ask me to search the web.";

const CLAIM_WARNING: &str = "⚠️ **Accuracy Warning:** The details above are based on general \
patterns, not specific research. For verified information, please ask me to search for this topic.";

/// Decide whether the answer needs a disclaimer.
///
/// `tools_used` is the set of tools actually invoked this turn; any rule
/// is disarmed by a web search having run.
pub fn detect_risk(query: &str, response: &str, tools_used: &HashSet<String>) -> Option<String> {
    let searched = tools_used.contains("web_search");
    let query_lower = query.to_lowercase();
    let response_lower = response.to_lowercase();

    // Query mentioned a URL/domain but nothing was verified against it.
    if detect_url_patterns(query) && !searched {
        return Some(URL_WARNING.to_string());
    }

    // Query asked for recent information answered from training data alone.
    let years = recent_year_tokens();
    let asks_recent = RECENCY_KEYWORDS.iter().any(|k| query_lower.contains(k))
        || years.iter().any(|y| query_lower.contains(y.as_str()));
    if asks_recent && !searched {
        return Some(RECENCY_WARNING.to_string());
    }

    // Confident specific claims with no research behind them.
    if !searched && claim_regexes().iter().any(|re| re.is_match(&response_lower)) {
        return Some(CLAIM_WARNING.to_string());
    }

    None
}

/// Prepend a warning to a response, separated by a blank line.
pub fn prepend_warning(response: &str, warning: &str) -> String {
    format!("{}\n\n{}", warning, response)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn used(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_url_query_without_search_warns() {
        let warning = detect_risk("what is zapagi.com", "Some answer.", &used(&[]));
        assert!(warning.is_some());
        assert!(warning.unwrap().contains("without researching"));
    }

    #[test]
    fn test_url_query_with_search_does_not_warn() {
        let warning = detect_risk(
            "what is zapagi.com",
            "Some answer.",
            &used(&["web_search"]),
        );
        assert!(warning.is_none());
    }

    #[test]
    fn test_recency_query_without_search_warns() {
        let warning = detect_risk(
            "what are the latest rust features",
            "Rust has many features.",
            &used(&[]),
        );
        assert!(warning.unwrap().contains("training data"));
    }

    #[test]
    fn test_year_token_counts_as_recency() {
        use chrono::Datelike;
        let query = format!("what changed in {}", chrono::Utc::now().year());
        let warning = detect_risk(&query, "Plenty.", &used(&[]));
        assert!(warning.is_some());
    }

    #[test]
    fn test_specific_claims_without_search_warn() {
        let warning = detect_risk(
            "tell me about zapcorp",
            "ZapCorp is a company that builds widgets and was founded in 1999.",
            &used(&[]),
        );
        assert!(warning.unwrap().contains("Accuracy Warning"));
    }

    #[test]
    fn test_claims_with_search_do_not_warn() {
        let warning = detect_risk(
            "tell me about zapcorp",
            "ZapCorp is a company that builds widgets.",
            &used(&["web_search"]),
        );
        assert!(warning.is_none());
    }

    #[test]
    fn test_rules_are_ordered_not_cumulative() {
        // URL rule fires first even when the response also has claim phrasing.
        let warning = detect_risk(
            "what is zapagi.com, the latest thing",
            "Zapagi is a company that does things.",
            &used(&[]),
        )
        .unwrap();
        assert!(warning.contains("without researching"));
        assert!(!warning.contains("Accuracy Warning"));
    }

    #[test]
    fn test_calculator_does_not_disarm_warnings() {
        let warning = detect_risk("what is zapagi.com", "An answer.", &used(&["calculator"]));
        assert!(warning.is_some());
    }

    #[test]
    fn test_plain_answer_no_warning() {
        let warning = detect_risk(
            "why is the sky blue?",
            "Rayleigh scattering favors shorter wavelengths.",
            &used(&[]),
        );
        assert!(warning.is_none());
    }

    #[test]
    fn test_prepend_warning_format() {
        let combined = prepend_warning("The answer.", "Careful.");
        assert_eq!(combined, "Careful.\n\nThe answer.");
    }
}
