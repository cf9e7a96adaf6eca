//! Passage store trait behind the vector backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::{ScoredSource, Source};

/// An ingested passage with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    /// The passage and its provenance.
    pub source: Source,
    /// Embedding computed at ingestion time.
    pub embedding: Vec<f32>,
}

/// A storage backend supporting dense and lexical similarity search.
///
/// Both search methods return results ordered by descending score, at most
/// `top_k` of them.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Insert passages, replacing any existing passage with the same id.
    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()>;

    /// The `top_k` passages most similar to `embedding`.
    async fn dense_search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredSource>>;

    /// The `top_k` passages that best match the terms of `query`.
    async fn sparse_search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredSource>>;

    /// Number of stored passages.
    async fn len(&self) -> Result<usize>;

    /// Whether the store holds no passages.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
