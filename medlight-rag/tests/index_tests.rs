//! Index backends: in-memory store search, hybrid retrieval and selection.

mod common;

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use common::VocabularyEmbedder;
use medlight_rag::{
    CandidateIndex, GraphSnapshot, IndexBackend, IndexComponents, IndexRetriever, IndexSnapshot,
    IndexedChunk, InMemoryKnowledgeGraph, InMemoryVectorStore, QueryMode, RagError, SearchOptions,
    Source, Triplet, VectorIndexRetriever, VectorStore,
};
use proptest::prelude::*;

const VOCABULARY: &[&str] = &["metformin", "diabetes", "statin", "cholesterol", "aspirin"];

fn corpus(embedder: &VocabularyEmbedder) -> Vec<IndexedChunk> {
    [
        ("n1", "metformin is first line therapy for type 2 diabetes"),
        ("n2", "statin therapy lowers cholesterol"),
        ("n3", "aspirin and statin use after myocardial infarction"),
    ]
    .iter()
    .map(|(id, text)| IndexedChunk {
        source: Source::new(*id, *text),
        embedding: embedder.vector(text),
    })
    .collect()
}

async fn vector_retriever() -> VectorIndexRetriever {
    let embedder = Arc::new(VocabularyEmbedder::new(VOCABULARY));
    let store = InMemoryVectorStore::new();
    store.upsert(&corpus(&embedder)).await.unwrap();
    VectorIndexRetriever::new(embedder, Arc::new(store))
}

fn options(mode: QueryMode, alpha: f32, k: usize) -> SearchOptions {
    SearchOptions { similarity_top_k: k, mode, alpha }
}

#[tokio::test]
async fn dense_mode_ranks_by_cosine() {
    let retriever = vector_retriever().await;
    let results =
        retriever.search("statin cholesterol", &options(QueryMode::Dense, 1.0, 2)).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id(), "n2");
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn sparse_mode_matches_terms_outside_the_vocabulary() {
    let retriever = vector_retriever().await;
    let results = retriever
        .search("myocardial infarction", &options(QueryMode::Sparse, 0.0, 5))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id(), "n3");
}

#[tokio::test]
async fn hybrid_mode_blends_both_signals() {
    let retriever = vector_retriever().await;
    let results = retriever
        .search("aspirin myocardial infarction", &options(QueryMode::Hybrid, 0.5, 3))
        .await
        .unwrap();

    assert_eq!(results[0].id(), "n3");
    assert!(results.len() <= 3);
}

#[tokio::test]
async fn zero_top_k_returns_nothing() {
    let retriever = vector_retriever().await;
    assert!(retriever.search("statin", &options(QueryMode::Hybrid, 0.5, 0)).await.unwrap().is_empty());
}

#[tokio::test]
async fn upsert_replaces_existing_id() {
    let store = InMemoryVectorStore::new();
    let chunk = |text: &str| IndexedChunk { source: Source::new("n1", text), embedding: vec![1.0] };
    store.upsert(&[chunk("old text")]).await.unwrap();
    store.upsert(&[chunk("new text")]).await.unwrap();

    assert_eq!(store.len().await.unwrap(), 1);
    assert!(store.sparse_search("old", 5).await.unwrap().is_empty());
    assert_eq!(store.sparse_search("new", 5).await.unwrap()[0].content(), "new text");
}

#[tokio::test]
async fn snapshot_file_round_trips_through_disk() {
    let embedder = VocabularyEmbedder::new(VOCABULARY);
    let snapshot = IndexSnapshot { dimensions: VOCABULARY.len(), chunks: corpus(&embedder) };

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(&snapshot).unwrap().as_bytes()).unwrap();

    let store = InMemoryVectorStore::from_snapshot_file(file.path()).await.unwrap();
    assert_eq!(store.snapshot().await, snapshot);
}

#[tokio::test]
async fn snapshot_with_wrong_dimensions_is_rejected() {
    let snapshot = IndexSnapshot {
        dimensions: 3,
        chunks: vec![IndexedChunk { source: Source::new("n1", "x"), embedding: vec![1.0] }],
    };
    let err = InMemoryVectorStore::from_snapshot(snapshot).await.unwrap_err();
    assert!(matches!(err, RagError::IndexError { .. }));
}

#[tokio::test]
async fn select_builds_the_configured_backend() {
    let graph = InMemoryKnowledgeGraph::from_snapshot(GraphSnapshot {
        sources: vec![Source::new("g1", "statins and myopathy")],
        triplets: vec![Triplet {
            subject: "statin".into(),
            relation: "causes".into(),
            object: "myopathy".into(),
            source_id: "g1".into(),
        }],
    })
    .await
    .unwrap();
    let components = IndexComponents {
        knowledge_graph: Some(Arc::new(graph)),
        ..IndexComponents::default()
    };

    let index = IndexRetriever::select(IndexBackend::Graph, components.clone()).unwrap();
    assert!(matches!(index, IndexRetriever::Graph(_)));
    let results = index.search("statin myopathy", &SearchOptions::default()).await.unwrap();
    assert_eq!(results[0].id(), "g1");

    let err = IndexRetriever::select(IndexBackend::Vector, components).err().unwrap();
    assert!(matches!(err, RagError::ConfigError(_)));
}

#[tokio::test]
async fn embedder_dimension_mismatch_is_an_embedding_error() {
    let embedder = Arc::new(VocabularyEmbedder::new(&["only"]));
    let store = Arc::new(InMemoryVectorStore::new());
    store
        .upsert(&[IndexedChunk { source: Source::new("n1", "only"), embedding: vec![1.0] }])
        .await
        .unwrap();

    struct Lying(Arc<VocabularyEmbedder>);
    #[async_trait::async_trait]
    impl medlight_rag::EmbeddingProvider for Lying {
        fn name(&self) -> &str {
            "lying"
        }
        async fn embed(&self, text: &str) -> medlight_rag::Result<Vec<f32>> {
            Ok(self.0.vector(text))
        }
        fn dimensions(&self) -> usize {
            7
        }
    }

    let retriever = VectorIndexRetriever::new(Arc::new(Lying(embedder)), store);
    let err = retriever.search("only", &options(QueryMode::Dense, 1.0, 3)).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn arb_chunk(dim: usize) -> impl Strategy<Value = IndexedChunk> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(id, text, embedding)| IndexedChunk { source: Source::new(id, text), embedding },
    )
}

/// **Property: in-memory dense search is ordered and bounded**
/// *For any* stored passages, dense search SHALL return results in descending
/// cosine order, at most `top_k` and at most the number of distinct ids.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.upsert(&chunks).await.unwrap();
                let unique: HashMap<&str, ()> =
                    chunks.iter().map(|c| (c.source.id.as_str(), ())).collect();
                (store.dense_search(&query, top_k).await.unwrap(), unique.len())
            });

            prop_assert!(results.len() <= top_k);
            prop_assert_eq!(results.len(), top_k.min(unique_count));
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
