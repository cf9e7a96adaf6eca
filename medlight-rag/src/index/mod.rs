//! Candidate indexes.
//!
//! A [`CandidateIndex`] answers one query string with a ranked list of
//! [`ScoredSource`]s. Two backends exist behind the trait:
//!
//! - [`VectorIndexRetriever`]: dense, sparse or hybrid lookup over a
//!   [`VectorStore`]
//! - [`GraphIndexRetriever`]: keyword lookup over a [`KnowledgeGraph`]
//!
//! [`IndexRetriever`] tags the two and is selected from configuration with
//! [`IndexRetriever::select`].

mod graph;
mod inmemory;
mod lexical;
mod store;
mod vector;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::IndexBackend;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::source::ScoredSource;

pub use graph::{GraphIndexRetriever, GraphSnapshot, InMemoryKnowledgeGraph, KnowledgeGraph, Triplet};
pub use inmemory::{InMemoryVectorStore, IndexSnapshot};
pub use lexical::tokenize;
pub use store::{IndexedChunk, VectorStore};
pub use vector::VectorIndexRetriever;

/// Which relevance signal a vector lookup uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Embedding similarity only.
    Dense,
    /// Lexical (BM25) matching only.
    Sparse,
    /// Weighted fusion of both, controlled by [`SearchOptions::alpha`].
    #[default]
    Hybrid,
}

/// Per-lookup parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of candidates to return.
    pub similarity_top_k: usize,
    /// Retrieval signal.
    pub mode: QueryMode,
    /// Dense weight in hybrid mode; `1.0` is fully semantic.
    pub alpha: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { similarity_top_k: 6, mode: QueryMode::Hybrid, alpha: 1.0 }
    }
}

impl SearchOptions {
    /// Options with the given candidate count and default mode.
    pub fn with_top_k(similarity_top_k: usize) -> Self {
        Self { similarity_top_k, ..Self::default() }
    }
}

/// A searchable store of ingested passages.
///
/// Implementations take a single query per call and return candidates in
/// descending order of their own score. They must tolerate concurrent
/// read-only calls.
#[async_trait]
pub trait CandidateIndex: Send + Sync {
    /// Backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Return up to `options.similarity_top_k` candidates for `query`.
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredSource>>;
}

/// The collaborators each backend needs; only the selected backend's fields
/// must be present.
#[derive(Default, Clone)]
pub struct IndexComponents {
    /// Query embedder for the vector backend.
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    /// Passage store for the vector backend.
    pub vector_store: Option<Arc<dyn VectorStore>>,
    /// Graph for the graph backend.
    pub knowledge_graph: Option<Arc<dyn KnowledgeGraph>>,
}

/// A candidate index backend selected by configuration.
pub enum IndexRetriever {
    /// Dense/hybrid vector index.
    Vector(VectorIndexRetriever),
    /// Knowledge-graph index.
    Graph(GraphIndexRetriever),
}

impl IndexRetriever {
    /// Build the backend named by `backend` from `components`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a component the selected backend
    /// needs is missing.
    pub fn select(backend: IndexBackend, components: IndexComponents) -> Result<Self> {
        match backend {
            IndexBackend::Vector => {
                let embedder = components.embedder.ok_or_else(|| {
                    RagError::ConfigError("vector backend requires an embedding provider".into())
                })?;
                let store = components.vector_store.ok_or_else(|| {
                    RagError::ConfigError("vector backend requires a vector store".into())
                })?;
                Ok(Self::Vector(VectorIndexRetriever::new(embedder, store)))
            }
            IndexBackend::Graph => {
                let graph = components.knowledge_graph.ok_or_else(|| {
                    RagError::ConfigError("graph backend requires a knowledge graph".into())
                })?;
                Ok(Self::Graph(GraphIndexRetriever::new(graph)))
            }
        }
    }
}

#[async_trait]
impl CandidateIndex for IndexRetriever {
    fn backend(&self) -> &str {
        match self {
            Self::Vector(retriever) => retriever.backend(),
            Self::Graph(retriever) => retriever.backend(),
        }
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredSource>> {
        match self {
            Self::Vector(retriever) => retriever.search(query, options).await,
            Self::Graph(retriever) => retriever.search(query, options).await,
        }
    }
}
