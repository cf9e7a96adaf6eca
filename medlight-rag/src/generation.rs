//! Answer generation from assembled evidence.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::error::{RagError, Result};
use crate::llm::{ChatModel, ChatRequest};

/// The assistant persona given to the answering model.
pub const PERSONALITY: &str = "You are MedLight, an assistant developed to help bridge medical \
research to the public.
The system will give you some relevant research articles that you can use.
Do not use research papers if they are irrelevant to the question.";

/// Inputs for one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Model that will answer.
    pub model: String,
    /// The user's question.
    pub question: String,
    /// Evidence blob already cut to the model's budget.
    pub evidence: String,
    /// Upper bound on generated tokens.
    pub max_output_tokens: usize,
}

/// Turns a question and its evidence into an answer.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce the answer text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// An [`AnswerGenerator`] prompting a [`ChatModel`].
///
/// The request carries the persona, the evidence and the question as three
/// messages. Models outside the GPT family reject consecutive system
/// messages, so for them the persona and evidence are merged into one.
pub struct LlmAnswerGenerator {
    model: Arc<dyn ChatModel>,
}

impl LlmAnswerGenerator {
    /// Create a generator backed by `model`.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

/// Build the completion request for `request`.
pub fn build_prompt(request: &GenerationRequest) -> ChatRequest {
    let evidence_prompt =
        format!("Here are some research papers that might be relevant: \n\n{}", request.evidence);
    let user_prompt = format!(
        "Please answer the following medical question and provide relevant references. \
         Question: {}",
        request.question
    );

    let prompt = ChatRequest::new()
        .model(request.model.clone())
        .temperature(0.0)
        .max_tokens(request.max_output_tokens);

    let prompt = if request.model.contains("gpt") {
        prompt.system(PERSONALITY).system(evidence_prompt)
    } else {
        prompt.system(format!("{PERSONALITY}\n\n{evidence_prompt}"))
    };
    prompt.user(user_prompt)
}

#[async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.model.complete(build_prompt(request)).await.map_err(|e| {
            error!(model = %request.model, error = %e, "answer generation failed");
            RagError::GenerationError(e.to_string())
        })
    }
}
