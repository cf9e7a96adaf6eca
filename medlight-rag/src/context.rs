//! Context-window budgeting for the evidence handed to generation.
//!
//! Token counting differs between model families, so the budget is
//! approximated in characters: the model's context length minus the tokens
//! reserved for the answer, times [`CHARS_PER_TOKEN`]. Only the serialized
//! evidence is cut to that budget; prompts and the question are never
//! truncated.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::ContextConfig;
use crate::source::ScoredSource;

/// Context length assumed for models missing from the registry.
pub const DEFAULT_CONTEXT_LENGTH: usize = 8192;

/// Tokens reserved for the model's answer.
pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 1200;

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: f64 = 1.8;

const BUILTIN_MODELS: &[(&str, usize)] = &[
    ("phi3:latest", 128_000),
    ("llama3:8b", 8192),
    ("llama3:instruct", 8192),
    ("gemma:2b", 8192),
    ("gemma:2b-instruct", 8192),
    ("gemma:7b-instruct", 8192),
    ("gemma:latest", 8192),
    ("gpt-3.5-turbo-0125", 16_385),
    ("gpt-4-0125-preview", 128_000),
    ("claude-3-opus-20240229", 200_000),
    ("claude-3-sonnet-20240229", 200_000),
    ("claude-3-haiku-20240307", 200_000),
    ("gemini-1.0-pro", 30_720),
    ("gemma-7b-it", 8192),
    ("mixtral-8x7b-32768", 32_768),
    ("llama2-70b-4096", 4096),
];

/// Read-only map from model name to context length in tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    lengths: BTreeMap<String, usize>,
    default_length: usize,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelRegistry {
    /// The models the assistant ships with.
    pub fn builtin() -> Self {
        Self {
            lengths: BUILTIN_MODELS.iter().map(|(name, len)| (name.to_string(), *len)).collect(),
            default_length: DEFAULT_CONTEXT_LENGTH,
        }
    }

    /// The built-in models with `config`'s overrides and fallback length.
    pub fn from_config(config: &ContextConfig) -> Self {
        let mut registry = Self::builtin();
        registry.default_length = config.default_context_length;
        registry.lengths.extend(config.models.iter().map(|(k, v)| (k.clone(), *v)));
        registry
    }

    /// Register or override one model.
    pub fn with_model(mut self, name: impl Into<String>, context_length: usize) -> Self {
        self.lengths.insert(name.into(), context_length);
        self
    }

    /// The registered context length of `model`, if any.
    pub fn get(&self, model: &str) -> Option<usize> {
        self.lengths.get(model).copied()
    }

    /// Context length of `model`, falling back to the default for unknown
    /// names.
    pub fn context_length(&self, model: &str) -> usize {
        self.get(model).unwrap_or_else(|| {
            debug!(model, default = self.default_length, "model not registered, using default");
            self.default_length
        })
    }

    /// Context length used for unknown models.
    pub fn default_context_length(&self) -> usize {
        self.default_length
    }

    /// Registered models in name order.
    pub fn models(&self) -> impl Iterator<Item = (&str, usize)> {
        self.lengths.iter().map(|(name, len)| (name.as_str(), *len))
    }
}

/// Evidence serialized and cut to a model's budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    /// The evidence blob to embed in the prompt.
    pub text: String,
    /// Context length used for the budget.
    pub context_length: usize,
    /// Budget in characters.
    pub budget_chars: usize,
    /// Whether the evidence was cut.
    pub truncated: bool,
}

/// Fits serialized evidence into a model's context budget.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    registry: Arc<ModelRegistry>,
    max_output_tokens: usize,
    chars_per_token: f64,
}

impl ContextAssembler {
    /// Create an assembler with the default output reservation and ratio.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry, max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS, chars_per_token: CHARS_PER_TOKEN }
    }

    /// Create an assembler from configuration, building its registry.
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            registry: Arc::new(ModelRegistry::from_config(config)),
            max_output_tokens: config.max_output_tokens,
            chars_per_token: config.chars_per_token,
        }
    }

    /// Set the tokens reserved for the answer.
    pub fn with_max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Set the characters assumed per token.
    pub fn with_chars_per_token(mut self, chars_per_token: f64) -> Self {
        self.chars_per_token = chars_per_token;
        self
    }

    /// The model registry in use.
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Tokens reserved for the answer.
    pub fn max_output_tokens(&self) -> usize {
        self.max_output_tokens
    }

    /// Evidence budget in characters for `model`, never negative.
    pub fn char_budget(&self, model: &str) -> usize {
        self.budget_for(self.registry.context_length(model))
    }

    fn budget_for(&self, context_length: usize) -> usize {
        let tokens = context_length.saturating_sub(self.max_output_tokens);
        (tokens as f64 * self.chars_per_token).floor() as usize
    }

    /// Serialize `evidence` and cut it to `model`'s budget.
    pub fn assemble(&self, model: &str, evidence: &[ScoredSource]) -> AssembledContext {
        let rendered = render_evidence(evidence);
        let context_length = self.registry.context_length(model);
        let budget_chars = self.budget_for(context_length);
        let text = truncate(&rendered, budget_chars);
        let truncated = text.len() < rendered.len();

        info!(
            model,
            evidence_count = evidence.len(),
            budget_chars,
            truncated,
            "assembled context"
        );
        AssembledContext {
            text: text.to_string(),
            context_length,
            budget_chars,
            truncated,
        }
    }
}

/// The first `max_chars` characters of `text`, never splitting a character.
///
/// Text already within budget is returned unchanged.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Serialize evidence as numbered citation blocks, in evidence order.
///
/// Empty evidence renders as an empty string.
pub fn render_evidence(evidence: &[ScoredSource]) -> String {
    let mut out = String::new();
    for (n, candidate) in evidence.iter().enumerate() {
        if n > 0 {
            out.push('\n');
        }
        let source = &candidate.source;
        out.push_str(&format!(
            "[{}] id: {}\ndoi: {}\nfile_name: {}\npage: {}\nscore: {:.2}\ncontent: {}\n",
            n + 1,
            source.id,
            source.doi,
            source.citation_name(),
            source.page,
            candidate.score,
            source.content
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 0), "");
    }

    #[test]
    fn default_model_budget_matches_ratio() {
        let assembler = ContextAssembler::new(Arc::new(ModelRegistry::builtin()));
        assert_eq!(assembler.char_budget("some-unlisted-model"), 12_585);
        assert_eq!(assembler.char_budget("llama2-70b-4096"), 5212);
    }

    #[test]
    fn budget_clamps_to_zero() {
        let registry = ModelRegistry::builtin().with_model("tiny", 100);
        let assembler = ContextAssembler::new(Arc::new(registry));
        assert_eq!(assembler.char_budget("tiny"), 0);
        assert!(assembler.assemble("tiny", &[ScoredSource::new(Source::new("a", "x"), 1.0)]).text.is_empty());
    }

    #[test]
    fn evidence_blocks_are_numbered() {
        let evidence = vec![
            ScoredSource::new(Source::new("n1", "first").with_file_name("a.pdf").with_page(3), 0.912),
            ScoredSource::new(Source::new("n2", "second"), 0.5),
        ];
        let text = render_evidence(&evidence);
        assert!(text.starts_with("[1] id: n1\n"));
        assert!(text.contains("file_name: a\npage: 3\nscore: 0.91\n"));
        assert!(text.contains("\n[2] id: n2\n"));
        assert!(render_evidence(&[]).is_empty());
    }
}
