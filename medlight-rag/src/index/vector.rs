//! Dense, sparse and hybrid lookup over a [`VectorStore`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::store::VectorStore;
use crate::index::{CandidateIndex, QueryMode, SearchOptions};
use crate::source::ScoredSource;

/// The vector index backend.
///
/// In [`QueryMode::Hybrid`] both signals are fetched with the same `top_k`,
/// min-max normalized per list and combined as
/// `alpha * dense + (1 - alpha) * sparse`. An `alpha` of `1.0` skips the
/// lexical lookup entirely and `0.0` skips the embedding call.
pub struct VectorIndexRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl VectorIndexRetriever {
    /// Create a retriever embedding queries with `embedder` and searching
    /// `store`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Return a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    async fn dense(&self, query: &str, top_k: usize) -> Result<Vec<ScoredSource>> {
        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(provider = self.embedder.name(), error = %e, "query embedding failed");
            e
        })?;
        if embedding.len() != self.embedder.dimensions() {
            return Err(RagError::EmbeddingError {
                provider: self.embedder.name().to_string(),
                message: format!(
                    "expected {} dimensions, got {}",
                    self.embedder.dimensions(),
                    embedding.len()
                ),
            });
        }
        self.store.dense_search(&embedding, top_k).await
    }

    async fn sparse(&self, query: &str, top_k: usize) -> Result<Vec<ScoredSource>> {
        self.store.sparse_search(query, top_k).await
    }
}

#[async_trait]
impl CandidateIndex for VectorIndexRetriever {
    fn backend(&self) -> &str {
        self.store.backend()
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredSource>> {
        let top_k = options.similarity_top_k;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let results = match options.mode {
            QueryMode::Dense => self.dense(query, top_k).await?,
            QueryMode::Sparse => self.sparse(query, top_k).await?,
            QueryMode::Hybrid if options.alpha >= 1.0 => self.dense(query, top_k).await?,
            QueryMode::Hybrid if options.alpha <= 0.0 => self.sparse(query, top_k).await?,
            QueryMode::Hybrid => {
                let (dense, sparse) =
                    futures::join!(self.dense(query, top_k), self.sparse(query, top_k));
                fuse_relative(dense?, sparse?, options.alpha, top_k)
            }
        };

        debug!(
            backend = self.backend(),
            mode = ?options.mode,
            result_count = results.len(),
            "vector lookup completed"
        );
        Ok(results)
    }
}

/// Min-max normalize scores into `[0, 1]`. A list whose scores are all equal
/// maps to `1.0` when positive and `0.0` otherwise.
fn normalize(results: &[ScoredSource]) -> Vec<f32> {
    let (min, max) = results.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), r| {
        (lo.min(r.score), hi.max(r.score))
    });
    results
        .iter()
        .map(|r| {
            if max > min {
                (r.score - min) / (max - min)
            } else if max > 0.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Relative-score fusion of a dense and a sparse result list.
///
/// Candidates keep the order of first appearance (dense list first) among
/// equal fused scores.
fn fuse_relative(
    dense: Vec<ScoredSource>,
    sparse: Vec<ScoredSource>,
    alpha: f32,
    top_k: usize,
) -> Vec<ScoredSource> {
    let dense_norm = normalize(&dense);
    let sparse_norm = normalize(&sparse);

    let mut fused: Vec<ScoredSource> = Vec::with_capacity(dense.len() + sparse.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (candidate, norm) in dense.into_iter().zip(dense_norm) {
        positions.insert(candidate.id().to_string(), fused.len());
        fused.push(ScoredSource::new(candidate.source, alpha * norm));
    }
    for (candidate, norm) in sparse.into_iter().zip(sparse_norm) {
        let weighted = (1.0 - alpha) * norm;
        match positions.get(candidate.id()) {
            Some(&slot) => fused[slot].score += weighted,
            None => {
                positions.insert(candidate.id().to_string(), fused.len());
                fused.push(ScoredSource::new(candidate.source, weighted));
            }
        }
    }

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(top_k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    fn scored(id: &str, score: f32) -> ScoredSource {
        ScoredSource::new(Source::new(id, id), score)
    }

    #[test]
    fn fusion_rewards_agreement_between_signals() {
        let dense = vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.1)];
        let sparse = vec![scored("b", 12.0), scored("d", 3.0)];

        let fused = fuse_relative(dense, sparse, 0.5, 10);
        let ids: Vec<&str> = fused.iter().map(|c| c.id()).collect();
        assert_eq!(ids[0], "b");
        assert_eq!(fused.len(), 4);
        assert!((fused[0].score - (0.5 * 0.875 + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn fusion_respects_top_k() {
        let dense = vec![scored("a", 0.9), scored("b", 0.5)];
        let sparse = vec![scored("c", 4.0), scored("d", 2.0)];
        assert_eq!(fuse_relative(dense, sparse, 0.3, 2).len(), 2);
    }

    #[test]
    fn normalize_handles_flat_lists() {
        assert_eq!(normalize(&[scored("a", 0.4), scored("b", 0.4)]), vec![1.0, 1.0]);
        assert_eq!(normalize(&[scored("a", 0.0)]), vec![0.0]);
        assert!(normalize(&[]).is_empty());
    }
}
