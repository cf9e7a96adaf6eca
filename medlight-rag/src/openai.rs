//! OpenAI-compatible embedding and chat-completion clients.
//!
//! This module is only available when the `openai` feature is enabled. The
//! base URL is configurable, so the same clients talk to OpenAI itself or to
//! a local server exposing the same API (Ollama, vLLM, llama.cpp).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{ChatModel, ChatRequest};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo-0125";

fn read_api_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|key| !key.is_empty())
}

// ── shared wire types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

async fn error_detail(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

// ── embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the `/embeddings` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use medlight_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env("OPENAI_API_KEY")?
///     .with_model("text-embedding-3-large")
///     .with_dimensions(1024);
/// let embedding = provider.embed("statin myopathy").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: "OpenAI".into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self::keyless().with_api_key(Some(api_key)))
    }

    /// Create a provider reading its key from the environment variable `var`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the variable is unset or empty.
    pub fn from_env(var: &str) -> Result<Self> {
        let api_key = read_api_key(var).ok_or_else(|| RagError::EmbeddingError {
            provider: "OpenAI".into(),
            message: format!("{var} environment variable not set"),
        })?;
        Self::new(api_key)
    }

    /// Create a provider that sends no credentials, for local servers.
    pub fn keyless() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        }
    }

    fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Set the API base URL (without the `/embeddings` suffix).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// This also updates the value returned by
    /// [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Declare the dimensionality of the model without requesting
    /// truncation, for servers that reject the `dimensions` field.
    pub fn with_native_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = None;
        self
    }

    fn failure(&self, message: String) -> RagError {
        RagError::EmbeddingError { provider: format!("OpenAI/{}", self.model), message }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", model = %self.model, text_len = text.len(), "embedding text");

        let body =
            EmbeddingRequest { model: &self.model, input: text, dimensions: self.request_dimensions };
        let mut request = self.client.post(format!("{}/embeddings", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "request failed");
            self.failure(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            error!(provider = "OpenAI", %status, "API error");
            return Err(self.failure(format!("API returned {status}: {detail}")));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse response");
            self.failure(format!("failed to parse response: {e}"))
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| self.failure("API returned empty response".into()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── chat completions ───────────────────────────────────────────────

/// A [`ChatModel`] backed by the `/chat/completions` endpoint.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAIChatModel {
    /// Create a client with the given API key and the default model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelError`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ModelError {
                model: DEFAULT_CHAT_MODEL.into(),
                message: "API key must not be empty".into(),
            });
        }
        let mut model = Self::keyless();
        model.api_key = Some(api_key);
        Ok(model)
    }

    /// Create a client reading its key from the environment variable `var`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelError`] if the variable is unset or empty.
    pub fn from_env(var: &str) -> Result<Self> {
        let api_key = read_api_key(var).ok_or_else(|| RagError::ModelError {
            model: DEFAULT_CHAT_MODEL.into(),
            message: format!("{var} environment variable not set"),
        })?;
        Self::new(api_key)
    }

    /// Create a client that sends no credentials, for local servers.
    pub fn keyless() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_CHAT_MODEL.into(),
        }
    }

    /// Set the API base URL (without the `/chat/completions` suffix).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model; requests naming a model override it.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionContent,
}

#[derive(Deserialize)]
struct CompletionContent {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let failure = |message: String| RagError::ModelError { model: model.to_string(), message };

        let body = CompletionRequest {
            model,
            messages: request
                .messages
                .iter()
                .map(|m| CompletionMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        debug!(model, message_count = body.messages.len(), "chat completion");

        let mut http = self.client.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            error!(model, error = %e, "request failed");
            failure(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            error!(model, %status, "API error");
            return Err(failure(format!("API returned {status}: {detail}")));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            error!(model, error = %e, "failed to parse response");
            failure(format!("failed to parse response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| failure("API returned no completion".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_keys_are_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::EmbeddingError { .. })));
        assert!(matches!(OpenAIChatModel::new(""), Err(RagError::ModelError { .. })));
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let model = OpenAIChatModel::keyless().with_base_url("http://localhost:11434/v1/");
        assert_eq!(model.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn matryoshka_dimensions_are_requested() {
        let provider = OpenAIEmbeddingProvider::keyless().with_dimensions(256);
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.request_dimensions, Some(256));

        let provider = provider.with_native_dimensions(768);
        assert_eq!(provider.request_dimensions, None);
    }
}
