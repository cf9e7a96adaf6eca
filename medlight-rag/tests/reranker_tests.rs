//! Reranking: sigmoid rescoring, ordering, top-k and non-mutation.

mod common;

use std::sync::Arc;

use common::{TableEncoder, scored};
use medlight_rag::{
    CrossEncoderReranker, NoOpReranker, RagError, Reranker, ScoredSource, Source, sigmoid,
};
use proptest::prelude::*;

fn candidates() -> Vec<ScoredSource> {
    vec![
        scored("a", "unrelated passage", 0.9),
        scored("b", "strong evidence", 0.5),
        scored("c", "weak evidence", 0.7),
    ]
}

#[tokio::test]
async fn cross_encoder_orders_by_sigmoid_of_logits() {
    let encoder =
        TableEncoder::new(&[("unrelated passage", -3.0), ("strong evidence", 4.0), ("weak evidence", 0.5)]);
    let reranker = CrossEncoderReranker::new(Arc::new(encoder));

    let ranked = reranker.get_top_k("does it work?", &candidates(), 2).await.unwrap();

    let ids: Vec<&str> = ranked.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["b", "c"]);
    assert_eq!(ranked[0].score, sigmoid(4.0));
    assert_eq!(ranked[1].score, sigmoid(0.5));
}

#[tokio::test]
async fn caller_candidates_are_not_mutated() {
    let encoder = Arc::new(TableEncoder::new(&[("strong evidence", 4.0)]));
    let reranker = CrossEncoderReranker::new(encoder);
    let original = candidates();
    let before = original.clone();

    let _ = reranker.get_top_k("q", &original, 3).await.unwrap();

    assert_eq!(original, before);
}

#[tokio::test]
async fn empty_candidates_skip_the_model() {
    let encoder = Arc::new(TableEncoder::new(&[]));
    let reranker = CrossEncoderReranker::new(encoder.clone());

    assert!(reranker.get_top_k("q", &[], 5).await.unwrap().is_empty());
    assert!(reranker.get_top_k("q", &candidates(), 0).await.unwrap().is_empty());
    assert_eq!(encoder.call_count(), 0);
}

#[tokio::test]
async fn k_larger_than_candidates_returns_all() {
    let reranker = CrossEncoderReranker::new(Arc::new(TableEncoder::new(&[])));
    assert_eq!(reranker.get_top_k("q", &candidates(), 50).await.unwrap().len(), 3);
}

#[tokio::test]
async fn equal_scores_keep_input_order() {
    let reranker = CrossEncoderReranker::new(Arc::new(TableEncoder::new(&[])));
    let ranked = reranker.get_top_k("q", &candidates(), 3).await.unwrap();
    let ids: Vec<&str> = ranked.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn model_failure_is_a_reranker_error() {
    let reranker = CrossEncoderReranker::new(Arc::new(TableEncoder::failing()));
    let err = reranker.get_top_k("q", &candidates(), 2).await.unwrap_err();
    assert!(matches!(err, RagError::RerankerError { ref reranker, .. } if reranker == "table"));
}

#[tokio::test]
async fn noop_passes_candidates_through() {
    let ranked = NoOpReranker.get_top_k("q", &candidates(), 2).await.unwrap();
    assert_eq!(ranked, candidates()[..2].to_vec());
}

fn arb_candidates() -> impl Strategy<Value = Vec<(ScoredSource, f32)>> {
    proptest::collection::vec(("[a-z]{4,10}", 0.0f32..1.0, -8.0f32..8.0), 0..15).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (text, score, logit))| {
                    let text = format!("{text}-{i}");
                    (ScoredSource::new(Source::new(format!("id{i}"), text), score), logit)
                })
                .collect()
        },
    )
}

/// **Property: reranker output is bounded, descending and deterministic**
/// *For any* candidates and k, `get_top_k` SHALL return `min(k, len)` items
/// in descending score order, identically on repeated calls.
mod prop_rerank_top_k {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn bounded_descending_and_repeatable(
            items in arb_candidates(),
            k in 0usize..20,
        ) {
            let table: Vec<(String, f32)> =
                items.iter().map(|(c, logit)| (c.content().to_string(), *logit)).collect();
            let table_refs: Vec<(&str, f32)> =
                table.iter().map(|(t, l)| (t.as_str(), *l)).collect();
            let candidates: Vec<ScoredSource> = items.into_iter().map(|(c, _)| c).collect();
            let reranker = CrossEncoderReranker::new(Arc::new(TableEncoder::new(&table_refs)));

            let rt = tokio::runtime::Runtime::new().unwrap();
            let (first, second) = rt.block_on(async {
                let first = reranker.get_top_k("query", &candidates, k).await.unwrap();
                let second = reranker.get_top_k("query", &candidates, k).await.unwrap();
                (first, second)
            });

            prop_assert_eq!(first.len(), k.min(candidates.len()));
            for pair in first.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for candidate in &first {
                prop_assert!((0.0..=1.0).contains(&candidate.score));
            }
            prop_assert_eq!(first, second);
        }
    }
}
