//! Knowledge-graph index backend.
//!
//! Ingestion extracts `(subject, relation, object)` triplets from each
//! passage. A lookup matches query keywords against the terms of those
//! triplets and scores each passage by the share of keywords it covers. Only
//! direct matches are considered; multi-hop traversal is left to dedicated
//! graph databases.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::index::lexical::tokenize;
use crate::index::{CandidateIndex, SearchOptions};
use crate::source::{ScoredSource, Source};

const BACKEND: &str = "knowledge-graph";

/// One extracted fact and the passage it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Triplet {
    /// Subject entity.
    pub subject: String,
    /// Relation between subject and object.
    pub relation: String,
    /// Object entity.
    pub object: String,
    /// Id of the passage the fact was extracted from.
    pub source_id: String,
}

/// Serialized contents of an [`InMemoryKnowledgeGraph`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    /// Passages referenced by the triplets.
    pub sources: Vec<Source>,
    /// Extracted facts.
    pub triplets: Vec<Triplet>,
}

/// A graph store that resolves keywords to scored passages.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Up to `limit` passages whose facts mention `keywords`, best first.
    async fn lookup(&self, keywords: &[String], limit: usize) -> Result<Vec<ScoredSource>>;
}

#[derive(Debug, Default)]
struct GraphInner {
    sources: Vec<Source>,
    positions: HashMap<String, usize>,
    terms: Vec<HashSet<String>>,
}

/// An in-memory [`KnowledgeGraph`].
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeGraph {
    inner: RwLock<GraphInner>,
}

impl InMemoryKnowledgeGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph holding the contents of `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexError`] if a triplet references a passage
    /// missing from the snapshot.
    pub async fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let graph = Self::new();
        for source in snapshot.sources {
            graph.add_source(source).await;
        }
        for triplet in &snapshot.triplets {
            graph.add_triplet(triplet).await?;
        }
        Ok(graph)
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
        let snapshot: GraphSnapshot = serde_json::from_str(&text)?;
        let triplet_count = snapshot.triplets.len();
        let graph = Self::from_snapshot(snapshot).await?;
        info!(path = %path.display(), triplet_count, "loaded graph snapshot");
        Ok(graph)
    }

    /// Add a passage, replacing an existing passage with the same id.
    pub async fn add_source(&self, source: Source) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        match inner.positions.get(&source.id).copied() {
            Some(slot) => inner.sources[slot] = source,
            None => {
                inner.positions.insert(source.id.clone(), inner.sources.len());
                inner.sources.push(source);
                inner.terms.push(HashSet::new());
            }
        }
    }

    /// Attach a fact to its passage.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexError`] if the passage is unknown.
    pub async fn add_triplet(&self, triplet: &Triplet) -> Result<()> {
        let mut inner = self.inner.write().await;
        let slot = inner.positions.get(&triplet.source_id).copied().ok_or_else(|| {
            RagError::IndexError {
                backend: BACKEND.to_string(),
                message: format!("triplet references unknown source '{}'", triplet.source_id),
            }
        })?;
        let text = format!("{} {} {}", triplet.subject, triplet.relation, triplet.object);
        inner.terms[slot].extend(tokenize(&text));
        Ok(())
    }
}

#[async_trait]
impl KnowledgeGraph for InMemoryKnowledgeGraph {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn lookup(&self, keywords: &[String], limit: usize) -> Result<Vec<ScoredSource>> {
        if keywords.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let mut scored: Vec<ScoredSource> = inner
            .sources
            .iter()
            .zip(&inner.terms)
            .filter_map(|(source, terms)| {
                let matched = keywords.iter().filter(|k| terms.contains(*k)).count();
                (matched > 0).then(|| {
                    ScoredSource::new(source.clone(), matched as f32 / keywords.len() as f32)
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// The knowledge-graph index backend.
///
/// Query keywords are the distinct terms of at least three characters;
/// [`SearchOptions::mode`] and [`SearchOptions::alpha`] do not apply.
pub struct GraphIndexRetriever {
    graph: Arc<dyn KnowledgeGraph>,
}

impl GraphIndexRetriever {
    /// Create a retriever over `graph`.
    pub fn new(graph: Arc<dyn KnowledgeGraph>) -> Self {
        Self { graph }
    }
}

fn keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|term| term.chars().count() >= 3 && seen.insert(term.clone()))
        .collect()
}

#[async_trait]
impl CandidateIndex for GraphIndexRetriever {
    fn backend(&self) -> &str {
        self.graph.backend()
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredSource>> {
        let keywords = keywords(query);
        let results = self.graph.lookup(&keywords, options.similarity_top_k).await?;
        debug!(
            backend = self.backend(),
            keyword_count = keywords.len(),
            result_count = results.len(),
            "graph lookup completed"
        );
        Ok(results)
    }
}
