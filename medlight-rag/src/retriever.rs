//! Multi-query retrieval with deduplication.
//!
//! Each query of a batch is looked up independently; the per-query candidate
//! lists are then merged so that every source id appears once, carrying the
//! best score any query gave it.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::{RagError, Result};
use crate::index::{CandidateIndex, SearchOptions};
use crate::source::ScoredSource;

/// Issues a batch of queries against one [`CandidateIndex`] and merges the
/// results.
///
/// # Example
///
/// ```rust,ignore
/// use medlight_rag::{MultiQueryRetriever, SearchOptions};
///
/// let retriever = MultiQueryRetriever::new(index, SearchOptions::with_top_k(6));
/// let candidates = retriever.retrieve(&expanded_queries).await?;
/// ```
pub struct MultiQueryRetriever {
    index: Arc<dyn CandidateIndex>,
    options: SearchOptions,
    parallel: bool,
}

impl MultiQueryRetriever {
    /// Create a retriever issuing lookups with `options`, concurrently by
    /// default.
    pub fn new(index: Arc<dyn CandidateIndex>, options: SearchOptions) -> Self {
        Self { index, options, parallel: true }
    }

    /// Issue lookups concurrently (`true`) or one after another.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The options used for every lookup.
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Look up every query and merge the candidates.
    ///
    /// The output holds one entry per source id, in order of first
    /// appearance (query order, then index order within a query), with the
    /// maximum score observed for that id. It is not re-sorted. A failed
    /// lookup is logged and contributes no candidates.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if the batch is non-empty and
    /// every lookup failed.
    pub async fn retrieve(&self, queries: &[String]) -> Result<Vec<ScoredSource>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = if self.parallel {
            join_all(queries.iter().map(|q| self.index.search(q, &self.options))).await
        } else {
            let mut outcomes = Vec::with_capacity(queries.len());
            for query in queries {
                outcomes.push(self.index.search(query, &self.options).await);
            }
            outcomes
        };

        let mut streams = Vec::with_capacity(outcomes.len());
        let mut failed = 0;
        for (query_index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(candidates) => streams.push(candidates),
                Err(e) => {
                    failed += 1;
                    warn!(
                        backend = self.index.backend(),
                        query_index,
                        error = %e,
                        "index lookup failed, skipping query"
                    );
                }
            }
        }

        if failed == queries.len() {
            return Err(RagError::IndexUnavailable { attempted: failed });
        }

        let merged = merge_candidates(streams);
        info!(
            query_count = queries.len(),
            failed_count = failed,
            candidate_count = merged.len(),
            "multi-query retrieval completed"
        );
        Ok(merged)
    }
}

/// Merge per-query candidate lists, keeping one entry per source id.
///
/// The first sighting of an id fixes its position and provenance; later
/// sightings can only raise its score.
pub fn merge_candidates<I>(streams: I) -> Vec<ScoredSource>
where
    I: IntoIterator<Item = Vec<ScoredSource>>,
{
    let mut merged: Vec<ScoredSource> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for candidate in streams.into_iter().flatten() {
        match positions.get(candidate.id()) {
            Some(&slot) => {
                if candidate.score > merged[slot].score {
                    merged[slot].score = candidate.score;
                }
            }
            None => {
                positions.insert(candidate.id().to_string(), merged.len());
                merged.push(candidate);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    fn scored(id: &str, content: &str, score: f32) -> ScoredSource {
        ScoredSource::new(Source::new(id, content), score)
    }

    #[test]
    fn repeated_ids_keep_first_position_and_max_score() {
        let merged = merge_candidates(vec![
            vec![scored("a", "first a", 0.4), scored("b", "b", 0.9)],
            vec![scored("c", "c", 0.5), scored("a", "second a", 0.7)],
        ]);

        let ids: Vec<&str> = merged.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged[0].score, 0.7);
        assert_eq!(merged[0].content(), "first a");
    }

    #[test]
    fn lower_repeat_does_not_lower_score() {
        let merged = merge_candidates(vec![vec![scored("a", "a", 0.8)], vec![scored("a", "a", 0.1)]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].score, 0.8);
    }

    #[test]
    fn no_streams_merge_to_nothing() {
        assert!(merge_candidates(Vec::<Vec<ScoredSource>>::new()).is_empty());
    }
}
