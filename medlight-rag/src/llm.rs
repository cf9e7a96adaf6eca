//! Chat-completion abstraction shared by the LLM-backed stages.
//!
//! Query expansion, HyDE and answer generation all talk to a language model
//! through [`ChatModel`]. The `openai` feature provides an implementation for
//! OpenAI-compatible servers; tests substitute scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::Role;
use crate::error::Result;

/// One message of a completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Create a message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// A single chat-completion request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    /// Model override; the implementation's default model when `None`.
    pub model: Option<String>,
    /// Conversation sent to the model.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<usize>,
}

impl ChatRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a system message.
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::new(Role::System, content));
        self
    }

    /// Append a user message.
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::new(Role::User, content));
        self
    }

    /// Target a specific model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the generated-token limit.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A language model reachable through a chat-completion interface.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model name used in logs and errors.
    fn name(&self) -> &str;

    /// Run one completion and return the generated text.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// Pull the first JSON value out of a model reply.
///
/// Models often wrap JSON in prose or code fences, so when the whole reply
/// does not parse this falls back to the outermost `{...}` and then the
/// outermost `[...]` span.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    [('{', '}'), ('[', ']')].into_iter().find_map(|(open, close)| {
        let start = trimmed.find(open)?;
        let end = trimmed.rfind(close)?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&trimmed[start..=end]).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let reply = "Sure! ```json\n{\"passage\": \"ACE inhibitors lower BP.\"}\n``` Hope it helps.";
        let value = extract_json(reply).unwrap();
        assert_eq!(value["passage"], "ACE inhibitors lower BP.");
    }

    #[test]
    fn extracts_bare_array() {
        let value = extract_json("Here: [\"a\", \"b\"]").unwrap();
        assert_eq!(value, serde_json::json!(["a", "b"]));
    }

    #[test]
    fn returns_none_without_json() {
        assert!(extract_json("no structured output here").is_none());
    }

    #[test]
    fn request_builder_appends_in_order() {
        let request = ChatRequest::new().system("be brief").user("hi").temperature(0.1);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.temperature, Some(0.1));
    }
}
