//! Error types for the `medlight-rag` crate.

use thiserror::Error;

/// Errors that can occur while retrieving, reranking or assembling evidence.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A candidate index lookup failed.
    #[error("Index error ({backend}): {message}")]
    IndexError {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Every lookup of a multi-query batch failed.
    #[error("Index unavailable: all {attempted} lookups failed")]
    IndexUnavailable {
        /// Number of lookups that were issued.
        attempted: usize,
    },

    /// A chat-completion call to a language model failed.
    #[error("Model error ({model}): {message}")]
    ModelError {
        /// The model that produced the error.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// Query expansion failed or returned malformed output.
    #[error("Query expansion error: {0}")]
    ExpansionError(String),

    /// Hypothetical document generation failed or returned malformed output.
    #[error("HyDE error: {0}")]
    HydeError(String),

    /// An error occurred during candidate reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// Answer generation failed.
    #[error("Generation error: {0}")]
    GenerationError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A retrieval evaluation error.
    #[error("Evaluation error: {0}")]
    EvalError(String),

    /// An I/O error while reading configuration, snapshots or datasets.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
