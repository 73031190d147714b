//! The [`VectorStore`] trait and the scripted mock used in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::Mutex;

use crate::error::{Result, RetrievalError};
use crate::filter::MetadataFilter;

/// Metadata attached to every indexed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning document id.
    pub document_id: i64,
    /// Filename of the owning document.
    pub filename: String,
    /// Owning project id.
    pub project_id: i64,
    /// Position of this chunk within the document.
    pub chunk_index: usize,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
    /// Similarity score (higher is closer).
    pub score: f32,
}

/// A chunk to be indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChunk {
    /// The chunk text.
    pub text: String,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// Trait for vector-store backends.
///
/// The store handles its own embedding; callers pass query strings and
/// chunk text, never vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Run a similarity search, optionally scoped by a metadata filter.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Index new chunks.
    async fn add_chunks(&self, chunks: Vec<NewChunk>) -> Result<()>;
}

/// A vector store that can be shared across tasks.
pub type SharedVectorStore = Arc<dyn VectorStore>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Vector Store
// ─────────────────────────────────────────────────────────────────────────────

/// A recorded search call.
#[derive(Debug, Clone)]
pub struct RecordedSearch {
    pub query: String,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
}

/// A mock vector store with scripted results and a call log.
#[derive(Debug, Default)]
pub struct MockVectorStore {
    results: Mutex<Vec<ScoredChunk>>,
    error: Mutex<Option<String>>,
    searches: Mutex<Vec<RecordedSearch>>,
    added: Mutex<Vec<NewChunk>>,
}

impl MockVectorStore {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock store returning the given results for every search.
    pub fn with_results(results: Vec<ScoredChunk>) -> Self {
        Self {
            results: Mutex::new(results),
            ..Self::default()
        }
    }

    /// Make every search fail with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Mutex::new(Some(message.into())),
            ..Self::default()
        }
    }

    /// Searches observed so far.
    pub fn searches(&self) -> Vec<RecordedSearch> {
        self.searches.lock().unwrap().clone()
    }

    /// Chunks indexed so far.
    pub fn added_chunks(&self) -> Vec<NewChunk> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        self.searches.lock().unwrap().push(RecordedSearch {
            query: query.to_string(),
            top_k,
            filter,
        });

        if let Some(message) = self.error.lock().unwrap().clone() {
            return Err(RetrievalError::backend(message));
        }

        let results = self.results.lock().unwrap();
        Ok(results.iter().take(top_k).cloned().collect())
    }

    async fn add_chunks(&self, chunks: Vec<NewChunk>) -> Result<()> {
        if let Some(message) = self.error.lock().unwrap().clone() {
            return Err(RetrievalError::backend(message));
        }
        self.added.lock().unwrap().extend(chunks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                document_id: 1,
                filename: "notes.md".to_string(),
                project_id: 1,
                chunk_index: 0,
            },
            score,
        }
    }

    #[tokio::test]
    async fn test_mock_store_results_and_log() {
        let store = MockVectorStore::with_results(vec![chunk("a", 0.9), chunk("b", 0.8)]);

        let results = store.search("query", 1, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "a");

        let searches = store.searches();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].query, "query");
        assert_eq!(searches[0].top_k, 1);
    }

    #[tokio::test]
    async fn test_mock_store_failure() {
        let store = MockVectorStore::failing("backend down");
        let err = store.search("query", 5, None).await.unwrap_err();
        assert!(err.to_string().contains("backend down"));
    }

    #[tokio::test]
    async fn test_mock_store_add_chunks() {
        let store = MockVectorStore::new();
        store
            .add_chunks(vec![NewChunk {
                text: "indexed".to_string(),
                metadata: chunk("x", 0.0).metadata,
            }])
            .await
            .unwrap();
        assert_eq!(store.added_chunks().len(), 1);
    }
}
