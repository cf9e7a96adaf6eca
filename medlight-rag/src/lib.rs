//! Retrieval core of the MedLight medical research assistant.
//!
//! This crate provides:
//! - Candidate indexes behind one [`CandidateIndex`] trait: a dense/hybrid
//!   vector index and a knowledge-graph index
//! - LLM query expansion and HyDE rewriting
//! - Multi-query retrieval with dedup by source id and max-score merging
//! - Cross-encoder reranking
//! - Context-window budgeting and answer generation
//! - Retrieval evaluation (hit rate, MRR, precision, recall, F1) and
//!   LLM-judged answer faithfulness and relevancy
//!
//! Optional features:
//! - `openai`: OpenAI-compatible embedding and chat clients
//! - `tei`: HTTP cross-encoder client for a `/rerank` endpoint

mod chat;
mod config;
mod context;
mod embedding;
mod error;
mod eval;
mod expansion;
mod generation;
mod hyde;
mod index;
mod llm;
mod pipeline;
mod reranker;
mod retriever;
mod source;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "tei")]
pub mod tei;

pub use chat::{Chat, Message, Role};
pub use config::{ContextConfig, FailurePolicy, IndexBackend, RagConfig, RagConfigBuilder};
pub use context::{
    AssembledContext, CHARS_PER_TOKEN, ContextAssembler, DEFAULT_CONTEXT_LENGTH,
    DEFAULT_MAX_OUTPUT_TOKENS, ModelRegistry, render_evidence, truncate,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use eval::{
    AnswerEvaluation, AnswerReport, AnswerSummary, EvalDataset, EvalReport, EvalSummary,
    Evaluator, JUDGE_TEMPERATURE, LlmJudge, QueryMetrics, Verdict, evaluate_retrieval,
    parse_verdict,
};
pub use expansion::{EXPANSION_TEMPERATURE, LlmQueryExpander, QueryExpander, parse_paraphrases};
pub use generation::{
    AnswerGenerator, GenerationRequest, LlmAnswerGenerator, PERSONALITY, build_prompt,
};
pub use hyde::{HYDE_TEMPERATURE, HypotheticalDocumentGenerator, LlmHyde, parse_passage};
pub use index::{
    CandidateIndex, GraphIndexRetriever, GraphSnapshot, InMemoryKnowledgeGraph,
    InMemoryVectorStore, IndexComponents, IndexRetriever, IndexSnapshot, IndexedChunk,
    KnowledgeGraph, QueryMode, SearchOptions, Triplet, VectorIndexRetriever, VectorStore,
    tokenize,
};
pub use llm::{ChatMessage, ChatModel, ChatRequest, extract_json};
pub use pipeline::{Answer, RagPipeline, RagPipelineBuilder, RetrievalReport};
pub use reranker::{
    CrossEncoder, CrossEncoderReranker, DEFAULT_CROSS_ENCODER_MODEL, MAX_SEQUENCE_LENGTH,
    NoOpReranker, Reranker, sigmoid,
};
pub use retriever::{MultiQueryRetriever, merge_candidates};
pub use source::{ScoredSource, Source};
