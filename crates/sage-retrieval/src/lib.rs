//! Vector-store boundary and retrieval gateway for Sage.
//!
//! The vector store itself is an external collaborator; this crate owns the
//! trait it must satisfy, the typed metadata filters the core builds, and
//! the [`ContextRetriever`] that turns selected documents plus a query into
//! a formatted context block for the prompt.

pub mod context;
pub mod error;
pub mod filter;
pub mod store;

pub use context::{ContextRetriever, RetrieverConfig};
pub use error::{Result, RetrievalError};
pub use filter::MetadataFilter;
pub use store::{ChunkMetadata, MockVectorStore, NewChunk, ScoredChunk, SharedVectorStore, VectorStore};
