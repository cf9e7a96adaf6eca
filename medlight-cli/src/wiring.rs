//! Builds a [`RagPipeline`] from [`Settings`].

use std::sync::Arc;

use anyhow::{Context, bail};
use medlight_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
use medlight_rag::tei::HttpCrossEncoder;
use medlight_rag::{
    ChatModel, CrossEncoderReranker, InMemoryKnowledgeGraph, InMemoryVectorStore, IndexBackend,
    IndexComponents, IndexRetriever, LlmAnswerGenerator, LlmHyde, LlmQueryExpander, RagPipeline,
};
use tracing::info;

use crate::settings::{ProviderSettings, Settings};

/// The configured chat model, keyed when an API key is available.
pub fn chat_model(providers: &ProviderSettings) -> anyhow::Result<Arc<dyn ChatModel>> {
    let model = match providers.api_key() {
        Some(key) => OpenAIChatModel::new(key)?,
        None => OpenAIChatModel::keyless(),
    };
    Ok(Arc::new(model.with_base_url(&providers.base_url).with_model(&providers.chat_model)))
}

async fn index_components(settings: &Settings) -> anyhow::Result<IndexComponents> {
    let mut components = IndexComponents::default();
    match settings.pipeline.index_backend {
        IndexBackend::Vector => {
            let Some(path) = &settings.index.vector_snapshot else {
                bail!("index.vector_snapshot must be set for the vector backend");
            };
            let store = InMemoryVectorStore::from_snapshot_file(path)
                .await
                .with_context(|| format!("failed to load vector index {}", path.display()))?;

            let providers = &settings.providers;
            let embedder = match providers.api_key() {
                Some(key) => OpenAIEmbeddingProvider::new(key)?,
                None => OpenAIEmbeddingProvider::keyless(),
            }
            .with_base_url(&providers.base_url)
            .with_model(&providers.embedding_model);
            let embedder = match providers.embedding_dimensions {
                Some(dims) => embedder.with_dimensions(dims),
                None => embedder.with_native_dimensions(store.dimensions().await),
            };

            components.embedder = Some(Arc::new(embedder));
            components.vector_store = Some(Arc::new(store));
        }
        IndexBackend::Graph => {
            let Some(path) = &settings.index.graph_snapshot else {
                bail!("index.graph_snapshot must be set for the graph backend");
            };
            let graph = InMemoryKnowledgeGraph::from_snapshot_file(path)
                .await
                .with_context(|| format!("failed to load knowledge graph {}", path.display()))?;
            components.knowledge_graph = Some(Arc::new(graph));
        }
    }
    Ok(components)
}

/// Assemble the pipeline described by `settings`.
pub async fn build_pipeline(settings: &Settings) -> anyhow::Result<RagPipeline> {
    let components = index_components(settings).await?;
    let index = IndexRetriever::select(settings.pipeline.index_backend, components)?;
    let model = chat_model(&settings.providers)?;

    let mut builder = RagPipeline::builder()
        .config(settings.pipeline.clone())
        .index(Arc::new(index))
        .expander(Arc::new(LlmQueryExpander::new(model.clone())))
        .hyde(Arc::new(LlmHyde::new(model.clone())))
        .generator(Arc::new(LlmAnswerGenerator::new(model)));

    if let Some(url) = &settings.providers.cross_encoder_url {
        let encoder =
            HttpCrossEncoder::new(url.as_str()).with_model(&settings.providers.cross_encoder_model);
        builder = builder.reranker(Arc::new(CrossEncoderReranker::new(Arc::new(encoder))));
    }

    let pipeline = builder.build()?;
    info!(
        backend = ?settings.pipeline.index_backend,
        reranking = settings.providers.cross_encoder_url.is_some(),
        "pipeline ready"
    );
    Ok(pipeline)
}
