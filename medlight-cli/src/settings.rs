//! Settings file for the `medlight` tool.
//!
//! ```toml
//! [pipeline]
//! rerank_top_k = 5
//! hyde = true
//!
//! [providers]
//! base_url = "http://localhost:11434/v1"
//! api_key_env = "OPENAI_API_KEY"
//! embedding_model = "nomic-embed-text"
//! chat_model = "llama3:8b"
//! cross_encoder_url = "http://localhost:8080"
//!
//! [index]
//! vector_snapshot = "data/index.json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use medlight_rag::openai::OPENAI_BASE_URL;
use medlight_rag::{DEFAULT_CROSS_ENCODER_MODEL, RagConfig};
use serde::Deserialize;

/// Everything the tool reads from its settings file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub pipeline: RagConfig,
    pub providers: ProviderSettings,
    pub index: IndexSettings,
}

/// Model endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Environment variable holding the API key; no key is sent when unset.
    pub api_key_env: Option<String>,
    pub embedding_model: String,
    /// Requested embedding size, for models supporting truncation.
    pub embedding_dimensions: Option<usize>,
    /// Model used for expansion, HyDE and answers.
    pub chat_model: String,
    /// Base URL of the cross-encoder server; reranking is off when unset.
    pub cross_encoder_url: Option<String>,
    pub cross_encoder_model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: None,
            chat_model: "gpt-3.5-turbo-0125".to_string(),
            cross_encoder_url: None,
            cross_encoder_model: DEFAULT_CROSS_ENCODER_MODEL.to_string(),
        }
    }
}

impl ProviderSettings {
    /// The API key, if a variable is configured and set.
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|key| !key.is_empty())
    }
}

/// Where the ingested indexes live.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexSettings {
    /// JSON snapshot of the vector index.
    pub vector_snapshot: Option<PathBuf>,
    /// JSON snapshot of the knowledge graph.
    pub graph_snapshot: Option<PathBuf>,
}

impl Settings {
    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(text).context("invalid settings file")?;
        settings.pipeline.validate()?;
        Ok(settings)
    }

    /// Read settings from `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("failed to load {}", path.display()))
    }
}
