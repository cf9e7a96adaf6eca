//! Configuration for the retrieval pipeline.
//!
//! Every field has a default, so a TOML file only needs to name what it
//! changes:
//!
//! ```toml
//! index_backend = "vector"
//! query_mode = "hybrid"
//! alpha = 0.7
//! rerank_top_k = 8
//! hyde = true
//!
//! [context.models]
//! "llama3:70b" = 8192
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::index::QueryMode;

/// Which candidate index backend serves lookups.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// Dense or hybrid vector index.
    #[default]
    Vector,
    /// Knowledge-graph index.
    Graph,
}

/// What the pipeline does when an optional query-rewriting stage fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and continue with the raw query text.
    #[default]
    FallbackToQuery,
    /// Propagate the failure and abort the turn.
    Abort,
}

/// Context-window budgeting parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Tokens reserved for the model's answer.
    pub max_output_tokens: usize,
    /// Characters assumed per token when converting budgets.
    pub chars_per_token: f64,
    /// Context length used for models missing from the registry.
    pub default_context_length: usize,
    /// Context lengths merged over the built-in model registry.
    pub models: BTreeMap<String, usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: crate::context::DEFAULT_MAX_OUTPUT_TOKENS,
            chars_per_token: crate::context::CHARS_PER_TOKEN,
            default_context_length: crate::context::DEFAULT_CONTEXT_LENGTH,
            models: BTreeMap::new(),
        }
    }
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Candidate index backend.
    pub index_backend: IndexBackend,
    /// Retrieval signal used by the vector backend.
    pub query_mode: QueryMode,
    /// Weight of the dense signal in hybrid mode (`1.0` is fully semantic).
    pub alpha: f32,
    /// Candidates per lookup when no reranker follows.
    pub similarity_top_k: usize,
    /// Candidates per lookup when a reranker cuts the set down afterwards.
    pub rerank_similarity_top_k: usize,
    /// Evidence kept after reranking.
    pub rerank_top_k: usize,
    /// Whether to run query expansion when an expander is configured.
    pub expansion: bool,
    /// Whether to run HyDE rewriting when a generator is configured.
    pub hyde: bool,
    /// Policy for a failed expansion call.
    pub expansion_failure: FailurePolicy,
    /// Policy for a failed HyDE call.
    pub hyde_failure: FailurePolicy,
    /// Issue the per-query lookups concurrently.
    pub parallel_fanout: bool,
    /// Context-window budgeting.
    pub context: ContextConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_backend: IndexBackend::Vector,
            query_mode: QueryMode::Hybrid,
            alpha: 1.0,
            similarity_top_k: 6,
            rerank_similarity_top_k: 50,
            rerank_top_k: 5,
            expansion: true,
            hyde: false,
            expansion_failure: FailurePolicy::FallbackToQuery,
            hyde_failure: FailurePolicy::FallbackToQuery,
            parallel_fanout: true,
            context: ContextConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse and validate a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the text is not valid TOML for
    /// this schema or fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| RagError::ConfigError(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] if the file cannot be read, or
    /// [`RagError::ConfigError`] as for [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - any of the `*_top_k` values is zero
    /// - `alpha` is outside `[0, 1]`
    /// - `context.chars_per_token` is not positive
    /// - `context.default_context_length` is zero
    pub fn validate(&self) -> Result<()> {
        if self.similarity_top_k == 0 {
            return Err(RagError::ConfigError(
                "similarity_top_k must be greater than zero".to_string(),
            ));
        }
        if self.rerank_similarity_top_k == 0 {
            return Err(RagError::ConfigError(
                "rerank_similarity_top_k must be greater than zero".to_string(),
            ));
        }
        if self.rerank_top_k == 0 {
            return Err(RagError::ConfigError("rerank_top_k must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(RagError::ConfigError(format!(
                "alpha ({}) must be between 0 and 1",
                self.alpha
            )));
        }
        if self.context.chars_per_token.is_nan() || self.context.chars_per_token <= 0.0 {
            return Err(RagError::ConfigError(format!(
                "context.chars_per_token ({}) must be positive",
                self.context.chars_per_token
            )));
        }
        if self.context.default_context_length == 0 {
            return Err(RagError::ConfigError(
                "context.default_context_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the candidate index backend.
    pub fn index_backend(mut self, backend: IndexBackend) -> Self {
        self.config.index_backend = backend;
        self
    }

    /// Set the retrieval signal used by the vector backend.
    pub fn query_mode(mut self, mode: QueryMode) -> Self {
        self.config.query_mode = mode;
        self
    }

    /// Set the dense-signal weight for hybrid retrieval.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.config.alpha = alpha;
        self
    }

    /// Set the candidates per lookup when no reranker is configured.
    pub fn similarity_top_k(mut self, k: usize) -> Self {
        self.config.similarity_top_k = k;
        self
    }

    /// Set the candidates per lookup when a reranker is configured.
    pub fn rerank_similarity_top_k(mut self, k: usize) -> Self {
        self.config.rerank_similarity_top_k = k;
        self
    }

    /// Set the number of sources kept after reranking.
    pub fn rerank_top_k(mut self, k: usize) -> Self {
        self.config.rerank_top_k = k;
        self
    }

    /// Enable or disable query expansion.
    pub fn expansion(mut self, enabled: bool) -> Self {
        self.config.expansion = enabled;
        self
    }

    /// Enable or disable HyDE rewriting.
    pub fn hyde(mut self, enabled: bool) -> Self {
        self.config.hyde = enabled;
        self
    }

    /// Set the policy for a failed expansion call.
    pub fn expansion_failure(mut self, policy: FailurePolicy) -> Self {
        self.config.expansion_failure = policy;
        self
    }

    /// Set the policy for a failed HyDE call.
    pub fn hyde_failure(mut self, policy: FailurePolicy) -> Self {
        self.config.hyde_failure = policy;
        self
    }

    /// Issue per-query lookups concurrently or one after another.
    pub fn parallel_fanout(mut self, parallel: bool) -> Self {
        self.config.parallel_fanout = parallel;
        self
    }

    /// Set the tokens reserved for the model's answer.
    pub fn max_output_tokens(mut self, tokens: usize) -> Self {
        self.config.context.max_output_tokens = tokens;
        self
    }

    /// Register or override the context length of a model.
    pub fn model_context_length(mut self, model: impl Into<String>, length: usize) -> Self {
        self.config.context.models.insert(model.into(), length);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] under the conditions listed on
    /// [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
