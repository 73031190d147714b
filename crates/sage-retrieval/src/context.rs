//! The retrieval gateway: selected documents + query in, context block out.
//!
//! Retrieval is best-effort by design. A backend failure degrades to
//! model-only answering; it never fails the request.

use std::collections::BTreeSet;

use crate::filter::MetadataFilter;
use crate::store::{ScoredChunk, SharedVectorStore};

/// Configuration for the retrieval gateway.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Number of chunks to request from the store.
    pub top_k: usize,
    /// Number of excerpts included in the context block.
    pub max_excerpts: usize,
    /// Character budget per excerpt.
    pub excerpt_chars: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_excerpts: 3,
            excerpt_chars: 500,
        }
    }
}

/// Translates a (project, selected documents, query) triple into a formatted
/// context block via the vector store.
pub struct ContextRetriever {
    store: SharedVectorStore,
    config: RetrieverConfig,
}

impl ContextRetriever {
    /// Create a retriever over the given store with default configuration.
    pub fn new(store: SharedVectorStore) -> Self {
        Self {
            store,
            config: RetrieverConfig::default(),
        }
    }

    /// Create a retriever with explicit configuration.
    pub fn with_config(store: SharedVectorStore, config: RetrieverConfig) -> Self {
        Self { store, config }
    }

    /// Build a context block for the query, scoped to the selected documents.
    ///
    /// Returns `None` when no documents are selected (context is opt-in per
    /// request, never automatic over a whole project), when the search comes
    /// back empty, or when the backend fails.
    pub async fn get_context(
        &self,
        project_id: i64,
        query: &str,
        document_ids: &[i64],
    ) -> Option<String> {
        let filter = MetadataFilter::for_documents(project_id, document_ids)?;

        tracing::debug!(
            project_id,
            documents = document_ids.len(),
            top_k = self.config.top_k,
            "Retrieval: searching"
        );

        let results = match self
            .store
            .search(query, self.config.top_k, Some(filter))
            .await
        {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(project_id, error = %e, "Retrieval failed, continuing without context");
                return None;
            }
        };

        if results.is_empty() {
            tracing::debug!(project_id, "Retrieval: no matching chunks");
            return None;
        }

        Some(format_context(&results, &self.config))
    }
}

/// Render search hits as a context block: a filename header over the top
/// hits, then score-labeled excerpts.
fn format_context(results: &[ScoredChunk], config: &RetrieverConfig) -> String {
    let top = &results[..results.len().min(config.max_excerpts)];

    // BTreeSet keeps the header deterministic.
    let filenames: BTreeSet<&str> = top.iter().map(|r| r.metadata.filename.as_str()).collect();
    let names: Vec<&str> = filenames.into_iter().collect();

    let mut parts = vec![
        format!("Based on the following document: {}", names.join(", ")),
        "\nRelevant excerpts:".to_string(),
    ];

    for (i, result) in top.iter().enumerate() {
        parts.push(format!("\n[Excerpt {} (relevance: {:.2})]", i + 1, result.score));
        parts.push(truncate_chars(&result.text, config.excerpt_chars));
    }

    parts.join("\n")
}

/// Truncate to a character budget without splitting a code point.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkMetadata, MockVectorStore};
    use std::sync::Arc;

    fn chunk(text: &str, filename: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                document_id: 1,
                filename: filename.to_string(),
                project_id: 1,
                chunk_index: 0,
            },
            score,
        }
    }

    #[tokio::test]
    async fn test_no_documents_selected_skips_retrieval() {
        let store = Arc::new(MockVectorStore::with_results(vec![chunk(
            "text", "a.md", 0.9,
        )]));
        let retriever = ContextRetriever::new(store.clone());

        let context = retriever.get_context(1, "query", &[]).await;
        assert!(context.is_none());
        // The store was never consulted.
        assert!(store.searches().is_empty());
    }

    #[tokio::test]
    async fn test_context_formatting() {
        let store = Arc::new(MockVectorStore::with_results(vec![
            chunk("Rust is memory safe.", "rust.md", 0.91),
            chunk("Ownership prevents data races.", "rust.md", 0.84),
        ]));
        let retriever = ContextRetriever::new(store);

        let context = retriever.get_context(1, "rust", &[1]).await.unwrap();
        assert!(context.starts_with("Based on the following document: rust.md"));
        assert!(context.contains("[Excerpt 1 (relevance: 0.91)]"));
        assert!(context.contains("[Excerpt 2 (relevance: 0.84)]"));
        assert!(context.contains("Rust is memory safe."));
    }

    #[tokio::test]
    async fn test_filter_shape_sent_to_store() {
        let store = Arc::new(MockVectorStore::with_results(vec![chunk("t", "a.md", 0.5)]));
        let retriever = ContextRetriever::new(store.clone());

        retriever.get_context(7, "query", &[2, 3]).await;

        let searches = store.searches();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].top_k, 5);
        let filter = searches[0].filter.as_ref().unwrap();
        assert_eq!(
            filter.to_query_value(),
            serde_json::json!({"$and": [
                {"project_id": {"$eq": 7}},
                {"$or": [
                    {"document_id": {"$eq": 2}},
                    {"document_id": {"$eq": 3}},
                ]},
            ]})
        );
    }

    #[tokio::test]
    async fn test_empty_results_yield_none() {
        let store = Arc::new(MockVectorStore::new());
        let retriever = ContextRetriever::new(store);
        assert!(retriever.get_context(1, "query", &[1]).await.is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_is_swallowed() {
        let store = Arc::new(MockVectorStore::failing("connection refused"));
        let retriever = ContextRetriever::new(store);
        assert!(retriever.get_context(1, "query", &[1]).await.is_none());
    }

    #[tokio::test]
    async fn test_excerpt_truncation() {
        let long = "x".repeat(2000);
        let store = Arc::new(MockVectorStore::with_results(vec![chunk(
            &long, "big.md", 0.7,
        )]));
        let retriever = ContextRetriever::new(store);

        let context = retriever.get_context(1, "query", &[1]).await.unwrap();
        // 500-char budget, so the 2000-char chunk must have been cut.
        assert!(!context.contains(&long));
        assert!(context.contains(&"x".repeat(500)));
    }

    #[test]
    fn test_truncate_chars_multibyte_safe() {
        let text = "héllo wörld";
        let truncated = truncate_chars(text, 5);
        assert_eq!(truncated, "héllo");
    }
}
