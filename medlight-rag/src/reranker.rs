//! Rerankers that re-score retrieved candidates against the original query.
//!
//! [`CrossEncoderReranker`] scores every `(query, passage)` pair jointly with a
//! cross-encoder, which is slower than the bi-encoder lookup but markedly more
//! precise, and so runs over a small candidate set only.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::source::ScoredSource;

/// Cross-encoder trained on PubMed search logs.
pub const DEFAULT_CROSS_ENCODER_MODEL: &str = "ncbi/MedCPT-Cross-Encoder";

/// Maximum tokens per `(query, passage)` pair; longer pairs are truncated by
/// the model's tokenizer.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

/// A reranker that re-scores and reorders candidates.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rescore `candidates` against `query` and return them best first.
    ///
    /// Returns new [`ScoredSource`]s; the caller's slice is left untouched.
    async fn rerank(&self, query: &str, candidates: &[ScoredSource]) -> Result<Vec<ScoredSource>>;

    /// Rerank and keep the best `min(k, candidates.len())`.
    ///
    /// Empty input or `k == 0` returns an empty list without invoking the
    /// model.
    async fn get_top_k(
        &self,
        query: &str,
        candidates: &[ScoredSource],
        k: usize,
    ) -> Result<Vec<ScoredSource>> {
        if candidates.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let mut ranked = self.rerank(query, candidates).await?;
        ranked.truncate(k);
        Ok(ranked)
    }
}

/// A no-op reranker that returns candidates unchanged.
///
/// # Example
///
/// ```rust,ignore
/// use medlight_rag::{NoOpReranker, Reranker};
///
/// let kept = NoOpReranker.get_top_k("query", &candidates, 5).await?;
/// // same order and scores as the first five candidates
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, candidates: &[ScoredSource]) -> Result<Vec<ScoredSource>> {
        Ok(candidates.to_vec())
    }
}

/// A model scoring `(query, passage)` pairs jointly.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Model name used in logs and errors.
    fn name(&self) -> &str;

    /// Maximum tokens per pair.
    fn max_sequence_length(&self) -> usize {
        MAX_SEQUENCE_LENGTH
    }

    /// Raw logits for each `(query, passage)` pair, in passage order.
    async fn predict(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// Map a logit to a relevance probability in `[0, 1]`.
pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

/// A [`Reranker`] backed by a [`CrossEncoder`].
///
/// All pairs are scored in one batch. The sigmoid of each logit becomes the
/// candidate's score and candidates are stably sorted by it, descending.
pub struct CrossEncoderReranker {
    encoder: Arc<dyn CrossEncoder>,
}

impl CrossEncoderReranker {
    /// Create a reranker over `encoder`.
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self { encoder }
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(&self, query: &str, candidates: &[ScoredSource]) -> Result<Vec<ScoredSource>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let passages: Vec<&str> = candidates.iter().map(|c| c.content()).collect();
        let logits = self.encoder.predict(query, &passages).await.map_err(|e| {
            error!(reranker = self.encoder.name(), error = %e, "cross-encoder scoring failed");
            RagError::RerankerError {
                reranker: self.encoder.name().to_string(),
                message: e.to_string(),
            }
        })?;

        if logits.len() != candidates.len() {
            error!(
                reranker = self.encoder.name(),
                expected = candidates.len(),
                received = logits.len(),
                "cross-encoder returned wrong number of scores"
            );
            return Err(RagError::RerankerError {
                reranker: self.encoder.name().to_string(),
                message: format!(
                    "expected {} scores, got {}",
                    candidates.len(),
                    logits.len()
                ),
            });
        }

        let mut ranked: Vec<ScoredSource> = candidates
            .iter()
            .zip(logits)
            .map(|(candidate, logit)| candidate.rescored(sigmoid(logit)))
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        debug!(reranker = self.encoder.name(), candidate_count = ranked.len(), "reranked");
        Ok(ranked)
    }
}
