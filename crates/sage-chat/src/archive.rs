//! Background archiving of web-search results as project documents.
//!
//! The engine enqueues [`SearchArchiveRequest`]s; a detached worker renders
//! them to markdown, stores a document row, and indexes the content. The
//! worker owns its *own* store handle and vector-store reference so it
//! never shares or blocks the request path's resources, and its failures
//! are logged, never propagated.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

use sage_agent::SearchArchiveRequest;
use sage_retrieval::{ChunkMetadata, NewChunk, SharedVectorStore};
use sage_store::{ChatStore, NewDocument};

use crate::constants::{CHUNK_OVERLAP, CHUNK_SIZE};
use crate::error::Result;

/// Spawn the archiver worker and return its input channel.
///
/// `store` must be a handle dedicated to the archiver (its own connection),
/// not the one serving chat requests.
pub fn spawn_search_archiver(
    store: Arc<ChatStore>,
    vectors: SharedVectorStore,
) -> UnboundedSender<SearchArchiveRequest> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SearchArchiveRequest>();

    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let query = request.query.clone();
            if let Err(e) = archive_search_results(&store, &vectors, request).await {
                tracing::warn!(%query, error = %e, "Failed to archive search results");
            }
        }
        tracing::debug!("Search archiver channel closed");
    });

    tx
}

/// Render, store, and index one batch of search results.
pub async fn archive_search_results(
    store: &ChatStore,
    vectors: &SharedVectorStore,
    request: SearchArchiveRequest,
) -> Result<()> {
    let content = render_search_document(&request.query, &request.results);
    let filename = format!(
        "websearch_{}_{}.md",
        sanitize_query(&request.query),
        Utc::now().format("%Y%m%d_%H%M%S")
    );

    let document = store.insert_document(NewDocument {
        project_id: request.project_id,
        filename: filename.clone(),
        content: content.clone(),
        content_type: "text/markdown".to_string(),
    })?;

    let chunks: Vec<NewChunk> = chunk_text(&content, CHUNK_SIZE, CHUNK_OVERLAP)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| NewChunk {
            text,
            metadata: ChunkMetadata {
                document_id: document.id,
                filename: filename.clone(),
                project_id: request.project_id,
                chunk_index,
            },
        })
        .collect();
    vectors.add_chunks(chunks).await?;

    tracing::info!(
        filename = %document.filename,
        results = request.results.len(),
        "Archived web search results as document"
    );
    Ok(())
}

/// Render search hits as a markdown document with clickable links.
pub fn render_search_document(query: &str, results: &[Value]) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
    let mut content = format!(
        "# Web Search: {}\n\n**Search Date:** {}\n**Number of Results:** {}\n\n---\n\n",
        query,
        timestamp,
        results.len()
    );

    for (i, result) in results.iter().enumerate() {
        let title = result
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("No title");
        let snippet = result
            .get("snippet")
            .and_then(|v| v.as_str())
            .unwrap_or("No description available");
        let url = result.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let engine = result
            .get("engine")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        content.push_str(&format!(
            "## {}. [{}]({})\n\n**Source:** {}\n\n{}\n\n---\n\n",
            i + 1,
            title,
            url,
            engine,
            snippet
        ));
    }

    content.push_str("*This document was automatically created by the web_search tool.*\n");
    content
}

/// Turn a query into a filename-safe stem, capped at 50 characters.
fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect()
}

/// Split text into overlapping character windows for indexing.
fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= size {
        return vec![text.to_string()];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sage_retrieval::MockVectorStore;
    use serde_json::json;

    fn request() -> SearchArchiveRequest {
        SearchArchiveRequest {
            project_id: 1,
            query: "example.org".to_string(),
            results: vec![
                json!({"title": "Example Domain", "url": "https://example.org", "snippet": "Illustrative.", "engine": "test"}),
                json!({"title": "Docs", "url": "https://example.org/docs", "snippet": "Manuals.", "engine": "test"}),
            ],
        }
    }

    #[test]
    fn test_render_search_document() {
        let req = request();
        let content = render_search_document(&req.query, &req.results);

        assert!(content.starts_with("# Web Search: example.org"));
        assert!(content.contains("**Number of Results:** 2"));
        assert!(content.contains("## 1. [Example Domain](https://example.org)"));
        assert!(content.contains("## 2. [Docs](https://example.org/docs)"));
        assert!(content.contains("**Source:** test"));
        assert!(content.ends_with("*This document was automatically created by the web_search tool.*\n"));
    }

    #[test]
    fn test_render_tolerates_missing_fields() {
        let content = render_search_document("q", &[json!({})]);
        assert!(content.contains("[No title]()"));
        assert!(content.contains("No description available"));
    }

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("example.org"), "example_org");
        assert_eq!(sanitize_query("rust async/await"), "rust async_await");
        assert_eq!(sanitize_query(&"q".repeat(80)).len(), 50);
    }

    #[test]
    fn test_chunk_text_short_is_single_chunk() {
        assert_eq!(chunk_text("short", 1000, 200), vec!["short".to_string()]);
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn test_chunk_text_overlap() {
        let text = "abcdefghij"; // 10 chars
        let chunks = chunk_text(text, 4, 2);
        assert_eq!(chunks[0], "abcd");
        assert_eq!(chunks[1], "cdef");
        // Every character is covered and windows overlap by two.
        assert!(chunks.last().unwrap().ends_with('j'));
    }

    #[tokio::test]
    async fn test_archive_inserts_document_and_indexes_chunks() {
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let project = store.create_project("P", None, &[]).unwrap();
        let mock = Arc::new(MockVectorStore::new());
        let vectors: SharedVectorStore = mock.clone();

        let mut req = request();
        req.project_id = project.id;
        archive_search_results(&store, &vectors, req).await.unwrap();

        let documents = store.documents_for_project(project.id).unwrap();
        assert_eq!(documents.len(), 1);
        assert!(documents[0].filename.starts_with("websearch_example_org_"));
        assert_eq!(documents[0].content_type, "text/markdown");

        // Indexed chunks point back at the stored document.
        let chunks = mock.added_chunks();
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].metadata.document_id, documents[0].id);
        assert_eq!(chunks[0].metadata.project_id, project.id);
    }

    #[tokio::test]
    async fn test_worker_processes_requests() {
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let project = store.create_project("P", None, &[]).unwrap();
        let vectors: SharedVectorStore = Arc::new(MockVectorStore::new());

        let tx = spawn_search_archiver(store.clone(), vectors);
        let mut req = request();
        req.project_id = project.id;
        tx.send(req).unwrap();

        // The worker is detached; poll briefly for its effect.
        for _ in 0..50 {
            if !store.documents_for_project(project.id).unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(store.documents_for_project(project.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_failure_does_not_panic() {
        let store = Arc::new(ChatStore::open_in_memory().unwrap());
        let project = store.create_project("P", None, &[]).unwrap();
        let vectors: SharedVectorStore = Arc::new(MockVectorStore::failing("index down"));

        let mut req = request();
        req.project_id = project.id;
        let result = archive_search_results(&store, &vectors, req).await;
        assert!(result.is_err());
    }
}
