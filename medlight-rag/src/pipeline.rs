//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] runs one turn of the assistant: query expansion,
//! optional HyDE rewriting, multi-query retrieval, reranking, context
//! assembly and, when a generator is configured, answer generation.
//!
//! # Example
//!
//! ```rust,ignore
//! use medlight_rag::{RagPipeline, RagConfig, IndexRetriever};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .index(Arc::new(index))
//!     .expander(Arc::new(expander))
//!     .reranker(Arc::new(reranker))
//!     .generator(Arc::new(generator))
//!     .build()?;
//!
//! let answer = pipeline.answer("does metformin cause B12 deficiency?", "gpt-3.5-turbo-0125").await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::chat::Chat;
use crate::config::{FailurePolicy, RagConfig};
use crate::context::{AssembledContext, ContextAssembler, ModelRegistry};
use crate::error::{RagError, Result};
use crate::expansion::QueryExpander;
use crate::generation::{AnswerGenerator, GenerationRequest};
use crate::hyde::HypotheticalDocumentGenerator;
use crate::index::{CandidateIndex, SearchOptions};
use crate::reranker::Reranker;
use crate::retriever::MultiQueryRetriever;
use crate::source::ScoredSource;

/// What retrieval did for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalReport {
    /// The question as asked.
    pub query: String,
    /// Queries produced by expansion (the question alone when disabled).
    pub expanded_queries: Vec<String>,
    /// Hypothetical passages issued against the index, if HyDE ran.
    pub hyde_passages: Vec<String>,
    /// Distinct candidates before reranking.
    pub candidates_considered: usize,
    /// Final evidence, best first when reranked.
    pub evidence: Vec<ScoredSource>,
}

/// A generated answer with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// The model's answer.
    pub text: String,
    /// Retrieval that produced the evidence.
    pub report: RetrievalReport,
    /// The evidence as handed to the model.
    pub context: AssembledContext,
}

/// The retrieval pipeline orchestrator. Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    retriever: MultiQueryRetriever,
    expander: Option<Arc<dyn QueryExpander>>,
    hyde: Option<Arc<dyn HypotheticalDocumentGenerator>>,
    reranker: Option<Arc<dyn Reranker>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    assembler: ContextAssembler,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the context assembler.
    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Retrieve and rerank evidence for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] for a blank query, the expander's or
    /// HyDE generator's error when its policy is [`FailurePolicy::Abort`],
    /// [`RagError::IndexUnavailable`] if every lookup failed, or the
    /// reranker's error.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalReport> {
        if query.trim().is_empty() {
            return Err(RagError::PipelineError("query must not be empty".to_string()));
        }

        let expanded_queries = self.expand(query).await?;
        let (lookups, hyde_passages) = self.rewrite(&expanded_queries).await?;

        let candidates = self.retriever.retrieve(&lookups).await?;
        let candidates_considered = candidates.len();

        let evidence = match &self.reranker {
            Some(reranker) => {
                reranker.get_top_k(query, &candidates, self.config.rerank_top_k).await?
            }
            None => candidates,
        };

        info!(
            query_count = lookups.len(),
            candidates_considered,
            evidence_count = evidence.len(),
            "retrieval completed"
        );

        Ok(RetrievalReport {
            query: query.to_string(),
            expanded_queries,
            hyde_passages,
            candidates_considered,
            evidence,
        })
    }

    /// Retrieve evidence for `query` and have `model` answer it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if no generator is configured, any
    /// error of [`retrieve`](Self::retrieve), or the generator's error.
    pub async fn answer(&self, query: &str, model: &str) -> Result<Answer> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| RagError::PipelineError("no answer generator configured".to_string()))?;

        let report = self.retrieve(query).await?;
        let context = self.assembler.assemble(model, &report.evidence);
        let request = GenerationRequest {
            model: model.to_string(),
            question: query.to_string(),
            evidence: context.text.clone(),
            max_output_tokens: self.assembler.max_output_tokens(),
        };
        let text = generator.generate(&request).await?;

        info!(model, answer_len = text.len(), "answer generated");
        Ok(Answer { text, report, context })
    }

    /// Answer `query` and record the turn on `chat`.
    ///
    /// Nothing is appended unless the whole turn succeeds.
    ///
    /// # Errors
    ///
    /// As for [`answer`](Self::answer).
    pub async fn respond(&self, chat: &mut Chat, query: &str, model: &str) -> Result<Answer> {
        let answer = self.answer(query, model).await?;
        chat.push_user(query);
        chat.push_assistant(
            answer.text.clone(),
            answer.report.evidence.clone(),
            answer.report.expanded_queries.clone(),
            answer.report.hyde_passages.clone(),
        );
        Ok(answer)
    }

    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let expander = match &self.expander {
            Some(expander) if self.config.expansion => expander,
            _ => return Ok(vec![query.to_string()]),
        };

        match expander.expand(query).await {
            Ok(queries) if !queries.is_empty() => Ok(queries),
            Ok(_) => Self::fallback(
                self.config.expansion_failure,
                RagError::ExpansionError("expander returned no queries".to_string()),
                query,
            ),
            Err(e) => Self::fallback(self.config.expansion_failure, e, query),
        }
    }

    fn fallback(policy: FailurePolicy, e: RagError, query: &str) -> Result<Vec<String>> {
        match policy {
            FailurePolicy::Abort => Err(e),
            FailurePolicy::FallbackToQuery => {
                warn!(error = %e, "query expansion failed, using the original query");
                Ok(vec![query.to_string()])
            }
        }
    }

    /// Returns the lookup queries and the passages HyDE produced.
    async fn rewrite(&self, queries: &[String]) -> Result<(Vec<String>, Vec<String>)> {
        let hyde = match &self.hyde {
            Some(hyde) if self.config.hyde => hyde,
            _ => return Ok((queries.to_vec(), Vec::new())),
        };

        let mut lookups = Vec::with_capacity(queries.len());
        let mut passages = Vec::new();
        for query in queries {
            match hyde.generate(query).await {
                Ok(passage) => {
                    passages.push(passage.clone());
                    lookups.push(passage);
                }
                Err(e) if self.config.hyde_failure == FailurePolicy::Abort => return Err(e),
                Err(e) => {
                    warn!(error = %e, "HyDE failed, using the query text");
                    lookups.push(query.clone());
                }
            }
        }
        Ok((lookups, passages))
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// Only the index is required; every other stage is skipped when absent.
/// A missing config defaults to [`RagConfig::default()`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .index(Arc::new(index))
///     .reranker(Arc::new(reranker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    index: Option<Arc<dyn CandidateIndex>>,
    expander: Option<Arc<dyn QueryExpander>>,
    hyde: Option<Arc<dyn HypotheticalDocumentGenerator>>,
    reranker: Option<Arc<dyn Reranker>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    registry: Option<Arc<ModelRegistry>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the candidate index.
    pub fn index(mut self, index: Arc<dyn CandidateIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the query expander.
    pub fn expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Set the hypothetical document generator.
    pub fn hyde(mut self, hyde: Arc<dyn HypotheticalDocumentGenerator>) -> Self {
        self.hyde = Some(hyde);
        self
    }

    /// Set a reranker; lookups then fetch `rerank_similarity_top_k`
    /// candidates each.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Share an existing model registry instead of building one from the
    /// configuration.
    pub fn model_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the index is missing or the
    /// configuration fails validation.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let index =
            self.index.ok_or_else(|| RagError::ConfigError("index is required".to_string()))?;

        let similarity_top_k = if self.reranker.is_some() {
            config.rerank_similarity_top_k
        } else {
            config.similarity_top_k
        };
        let options =
            SearchOptions { similarity_top_k, mode: config.query_mode, alpha: config.alpha };
        let retriever =
            MultiQueryRetriever::new(index, options).with_parallel(config.parallel_fanout);

        let assembler = match self.registry {
            Some(registry) => ContextAssembler::new(registry)
                .with_max_output_tokens(config.context.max_output_tokens)
                .with_chars_per_token(config.context.chars_per_token),
            None => ContextAssembler::from_config(&config.context),
        };

        Ok(RagPipeline {
            config,
            retriever,
            expander: self.expander,
            hyde: self.hyde,
            reranker: self.reranker,
            generator: self.generator,
            assembler,
        })
    }
}
