//! Hypothetical document embeddings (HyDE).
//!
//! Instead of searching with the question itself, a language model writes the
//! passage a paper answering it might contain, and that passage is issued
//! against the index.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::llm::{ChatModel, ChatRequest, extract_json};

/// Sampling temperature for passage generation; high for diverse passages.
pub const HYDE_TEMPERATURE: f32 = 0.7;

/// Produces a synthetic evidence passage for a query.
#[async_trait]
pub trait HypotheticalDocumentGenerator: Send + Sync {
    /// Write one passage answering `query`.
    async fn generate(&self, query: &str) -> Result<String>;
}

/// A [`HypotheticalDocumentGenerator`] backed by a language model.
pub struct LlmHyde {
    model: Arc<dyn ChatModel>,
}

impl LlmHyde {
    /// Create a generator backed by `model`.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

fn prompt(query: &str) -> String {
    format!(
        "You are an expert medical researcher, please write a scientific paper passage to \
         answer the following question:\n'{query}'\n\nRespond with a JSON object of the form \
         {{\"passage\": \"...\"}} where \"passage\" is a scientific paper passage answering \
         the question."
    )
}

#[async_trait]
impl HypotheticalDocumentGenerator for LlmHyde {
    async fn generate(&self, query: &str) -> Result<String> {
        let request = ChatRequest::new().user(prompt(query)).temperature(HYDE_TEMPERATURE);

        let reply = self.model.complete(request).await.map_err(|e| {
            error!(model = self.model.name(), error = %e, "HyDE call failed");
            RagError::HydeError(format!("model call failed: {e}"))
        })?;

        let passage = parse_passage(&reply)?;
        debug!(passage_len = passage.len(), "generated hypothetical passage");
        Ok(passage)
    }
}

/// Parse the `passage` field out of a model reply.
///
/// # Errors
///
/// Returns [`RagError::HydeError`] if the field is missing or blank.
pub fn parse_passage(reply: &str) -> Result<String> {
    let value = extract_json(reply)
        .ok_or_else(|| RagError::HydeError("reply contains no JSON".to_string()))?;
    let passage = value
        .get("passage")
        .and_then(|p| p.as_str())
        .map(str::trim)
        .ok_or_else(|| RagError::HydeError("reply is missing the 'passage' field".to_string()))?;
    if passage.is_empty() {
        return Err(RagError::HydeError("passage is empty".to_string()));
    }
    Ok(passage.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_passage_field() {
        let reply = r#"{"passage": "  Statins reduce LDL cholesterol.  "}"#;
        assert_eq!(parse_passage(reply).unwrap(), "Statins reduce LDL cholesterol.");
    }

    #[test]
    fn blank_or_missing_passage_is_an_error() {
        assert!(matches!(parse_passage(r#"{"passage": ""}"#), Err(RagError::HydeError(_))));
        assert!(matches!(parse_passage(r#"{"text": "x"}"#), Err(RagError::HydeError(_))));
    }

    #[test]
    fn prompt_quotes_the_question() {
        assert!(prompt("is aspirin safe?").contains("'is aspirin safe?'"));
    }
}
