//! Query expansion: rewrite one question into several paraphrases.
//!
//! Issuing every paraphrase against the index widens recall for questions
//! whose wording differs from the literature. The original question is always
//! the last element of the expansion.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::llm::{ChatModel, ChatRequest, extract_json};

/// Sampling temperature for paraphrasing; low so rewrites stay on topic.
pub const EXPANSION_TEMPERATURE: f32 = 0.1;

const EXPANSION_PROMPT: &str = "Perform query paraphrasing. If there are multiple common ways \
of phrasing a user question or common synonyms for key words in the question, make sure to \
return multiple versions of the query with the different phrasings.

If there are acronyms or words you are not familiar with, do not try to rephrase them.

Return at least 3 versions of the question.

Respond with a JSON object of the form {\"paraphrased_query\": [\"...\", \"...\"]} where \
\"paraphrased_query\" is a list of unique paraphrasings of the original question.";

/// Rewrites a question into the list of queries to issue.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Return paraphrases of `query` followed by `query` itself.
    ///
    /// The result is never empty. Near-duplicate paraphrases are allowed.
    async fn expand(&self, query: &str) -> Result<Vec<String>>;
}

/// A [`QueryExpander`] that asks a language model for paraphrases.
///
/// # Example
///
/// ```rust,ignore
/// use medlight_rag::{LlmQueryExpander, QueryExpander};
///
/// let expander = LlmQueryExpander::new(Arc::new(chat_model));
/// let queries = expander.expand("does metformin cause B12 deficiency?").await?;
/// assert_eq!(queries.last().unwrap(), "does metformin cause B12 deficiency?");
/// ```
pub struct LlmQueryExpander {
    model: Arc<dyn ChatModel>,
}

impl LlmQueryExpander {
    /// Create an expander backed by `model`.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl QueryExpander for LlmQueryExpander {
    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let request = ChatRequest::new()
            .system(EXPANSION_PROMPT)
            .user(query)
            .temperature(EXPANSION_TEMPERATURE);

        let reply = self.model.complete(request).await.map_err(|e| {
            error!(model = self.model.name(), error = %e, "query expansion call failed");
            RagError::ExpansionError(format!("model call failed: {e}"))
        })?;

        let mut queries = parse_paraphrases(&reply)?;
        queries.push(query.to_string());
        debug!(query_count = queries.len(), "expanded query");
        Ok(queries)
    }
}

/// Parse the paraphrase list out of a model reply.
///
/// Accepts `{"paraphrased_query": [...]}` or a bare JSON array of strings.
/// Blank entries are dropped.
///
/// # Errors
///
/// Returns [`RagError::ExpansionError`] if the reply holds no usable
/// paraphrase.
pub fn parse_paraphrases(reply: &str) -> Result<Vec<String>> {
    let value = extract_json(reply)
        .ok_or_else(|| RagError::ExpansionError("reply contains no JSON".to_string()))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("paraphrased_query") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(RagError::ExpansionError(
                    "reply is missing the 'paraphrased_query' list".to_string(),
                ));
            }
        },
        _ => return Err(RagError::ExpansionError("reply is not a JSON list".to_string())),
    };

    let paraphrases: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if paraphrases.is_empty() {
        return Err(RagError::ExpansionError("reply contains no paraphrases".to_string()));
    }
    Ok(paraphrases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_form() {
        let reply = r#"{"paraphrased_query": ["a question", " ", "another question"]}"#;
        assert_eq!(parse_paraphrases(reply).unwrap(), vec!["a question", "another question"]);
    }

    #[test]
    fn parses_bare_array() {
        assert_eq!(parse_paraphrases(r#"["only one"]"#).unwrap(), vec!["only one"]);
    }

    #[test]
    fn rejects_empty_or_malformed_output() {
        assert!(matches!(
            parse_paraphrases(r#"{"paraphrased_query": []}"#),
            Err(RagError::ExpansionError(_))
        ));
        assert!(matches!(parse_paraphrases("I cannot help"), Err(RagError::ExpansionError(_))));
        assert!(matches!(
            parse_paraphrases(r#"{"queries": ["x"]}"#),
            Err(RagError::ExpansionError(_))
        ));
    }
}
