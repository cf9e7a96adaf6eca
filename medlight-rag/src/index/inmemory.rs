//! In-memory passage store using cosine similarity and tantivy BM25.
//!
//! [`InMemoryVectorStore`] keeps passages in insertion order behind a
//! `tokio::sync::RwLock`, so concurrent lookups share a read lock. It can be
//! loaded from and written to a JSON [`IndexSnapshot`] produced by the
//! ingestion job.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{RagError, Result};
use crate::index::lexical::LexicalIndex;
use crate::index::store::{IndexedChunk, VectorStore};
use crate::source::ScoredSource;

const BACKEND: &str = "in-memory";

/// Serialized contents of an [`InMemoryVectorStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexSnapshot {
    /// Embedding dimensionality shared by all chunks.
    pub dimensions: usize,
    /// The indexed passages.
    pub chunks: Vec<IndexedChunk>,
}

#[derive(Debug, Default)]
struct Inner {
    chunks: Vec<IndexedChunk>,
    positions: HashMap<String, usize>,
    lexical: LexicalIndex,
}

/// An in-memory passage store.
///
/// Ties in either search are broken by insertion order, so results are
/// deterministic for a given store.
///
/// # Example
///
/// ```rust,ignore
/// use medlight_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::from_snapshot_file("index.json").await?;
/// let hits = store.sparse_search("metformin lactic acidosis", 6).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the chunks of `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexError`] if a chunk's embedding length does not
    /// match `snapshot.dimensions`.
    pub async fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        if let Some(chunk) =
            snapshot.chunks.iter().find(|c| c.embedding.len() != snapshot.dimensions)
        {
            return Err(RagError::IndexError {
                backend: BACKEND.to_string(),
                message: format!(
                    "chunk '{}' has {} dimensions, snapshot declares {}",
                    chunk.source.id,
                    chunk.embedding.len(),
                    snapshot.dimensions
                ),
            });
        }

        let store = Self::new();
        store.upsert(&snapshot.chunks).await?;
        Ok(store)
    }

    /// Load a JSON snapshot from disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error if the file cannot be read or parsed, or
    /// an index error as for [`from_snapshot`](Self::from_snapshot).
    pub async fn from_snapshot_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let snapshot: IndexSnapshot = serde_json::from_str(&text)?;
        let chunk_count = snapshot.chunks.len();
        let store = Self::from_snapshot(snapshot).await?;
        info!(path = %path.display(), chunk_count, "loaded index snapshot");
        Ok(store)
    }

    /// Embedding length of the stored passages, zero when empty.
    pub async fn dimensions(&self) -> usize {
        self.inner.read().await.chunks.first().map(|c| c.embedding.len()).unwrap_or(0)
    }

    /// Copy the current contents into a snapshot.
    pub async fn snapshot(&self) -> IndexSnapshot {
        let inner = self.inner.read().await;
        let dimensions = inner.chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        IndexSnapshot { dimensions, chunks: inner.chunks.clone() }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn top_k(mut scored: Vec<ScoredSource>, top_k: usize) -> Vec<ScoredSource> {
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn upsert(&self, chunks: &[IndexedChunk]) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        inner
            .lexical
            .upsert(chunks.iter().map(|c| (c.source.id.as_str(), c.source.content.as_str())))?;
        for chunk in chunks {
            match inner.positions.get(&chunk.source.id).copied() {
                Some(slot) => inner.chunks[slot] = chunk.clone(),
                None => {
                    inner.positions.insert(chunk.source.id.clone(), inner.chunks.len());
                    inner.chunks.push(chunk.clone());
                }
            }
        }
        Ok(())
    }

    async fn dense_search(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredSource>> {
        let inner = self.inner.read().await;
        let scored = inner
            .chunks
            .iter()
            .map(|chunk| {
                ScoredSource::new(
                    chunk.source.clone(),
                    cosine_similarity(&chunk.embedding, embedding),
                )
            })
            .collect();
        Ok(top_k(scored, k))
    }

    async fn sparse_search(&self, query: &str, k: usize) -> Result<Vec<ScoredSource>> {
        let inner = self.inner.read().await;
        let mut hits: Vec<(usize, ScoredSource)> = inner
            .lexical
            .search(query, k)?
            .into_iter()
            .filter_map(|(id, score)| {
                let slot = *inner.positions.get(&id)?;
                Some((slot, ScoredSource::new(inner.chunks[slot].source.clone(), score)))
            })
            .collect();
        hits.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.read().await.chunks.len())
    }
}
