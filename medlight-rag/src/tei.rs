//! Cross-encoder served over HTTP.
//!
//! This module is only available when the `tei` feature is enabled. It
//! targets a text-embeddings-inference style `/rerank` endpoint serving a
//! cross-encoder such as `ncbi/MedCPT-Cross-Encoder`; the server tokenizes
//! and truncates each pair to the model's maximum sequence length.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::reranker::{CrossEncoder, DEFAULT_CROSS_ENCODER_MODEL};

/// A [`CrossEncoder`] calling a remote `/rerank` endpoint.
///
/// Scores are requested raw (`raw_scores = true`) so that
/// [`CrossEncoderReranker`](crate::CrossEncoderReranker) applies the sigmoid
/// itself.
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpCrossEncoder {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/rerank", base_url.trim_end_matches('/')),
            model: DEFAULT_CROSS_ENCODER_MODEL.to_string(),
        }
    }

    /// Set the model name reported in logs and sent to multi-model servers.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn failure(&self, message: String) -> RagError {
        RagError::RerankerError { reranker: self.model.clone(), message }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    texts: &'a [&'a str],
    raw_scores: bool,
    truncate: bool,
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn predict(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        debug!(reranker = %self.model, pair_count = passages.len(), "scoring pairs");

        let body = RerankRequest {
            model: &self.model,
            query,
            texts: passages,
            raw_scores: true,
            truncate: true,
        };
        let response = self.client.post(&self.url).json(&body).send().await.map_err(|e| {
            error!(reranker = %self.model, error = %e, "request failed");
            self.failure(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(reranker = %self.model, %status, "rerank server error");
            return Err(self.failure(format!("server returned {status}: {detail}")));
        }

        let json: Value = response.json().await.map_err(|e| {
            error!(reranker = %self.model, error = %e, "failed to parse response");
            self.failure(format!("failed to parse response: {e}"))
        })?;
        parse_rerank_response(&json, passages.len()).map_err(|message| self.failure(message))
    }
}

/// Align rerank results to passage order.
///
/// Accepts a bare array of `{index, score}` objects or an object holding one
/// under `results` or `data`; the score may be named `score` or
/// `relevance_score`. Every passage must receive exactly one score.
pub fn parse_rerank_response(
    json: &Value,
    passage_count: usize,
) -> std::result::Result<Vec<f32>, String> {
    let items = json
        .as_array()
        .or_else(|| json.get("results").and_then(Value::as_array))
        .or_else(|| json.get("data").and_then(Value::as_array))
        .ok_or_else(|| "response is missing a results array".to_string())?;

    let mut scores: Vec<Option<f32>> = vec![None; passage_count];
    for item in items {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .ok_or_else(|| "rerank result missing index".to_string())? as usize;
        let score = item
            .get("score")
            .or_else(|| item.get("relevance_score"))
            .and_then(Value::as_f64)
            .ok_or_else(|| "rerank result missing score".to_string())? as f32;
        let slot = scores
            .get_mut(index)
            .ok_or_else(|| format!("rerank result index {index} out of range"))?;
        *slot = Some(score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, score)| score.ok_or_else(|| format!("no score returned for passage {i}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_tei_array_by_index() {
        let json = serde_json::json!([
            { "index": 1, "score": -2.5 },
            { "index": 0, "score": 3.0 }
        ]);
        assert_eq!(parse_rerank_response(&json, 2).unwrap(), vec![3.0, -2.5]);
    }

    #[test]
    fn accepts_results_object() {
        let json = serde_json::json!({
            "results": [{ "index": 0, "relevance_score": 0.7 }]
        });
        assert_eq!(parse_rerank_response(&json, 1).unwrap(), vec![0.7]);
    }

    #[test]
    fn missing_or_out_of_range_scores_are_errors() {
        let json = serde_json::json!([{ "index": 0, "score": 1.0 }]);
        assert!(parse_rerank_response(&json, 2).is_err());

        let json = serde_json::json!([{ "index": 5, "score": 1.0 }]);
        assert!(parse_rerank_response(&json, 1).is_err());
    }

    #[test]
    fn url_gets_rerank_suffix() {
        let encoder = HttpCrossEncoder::new("http://localhost:8080/");
        assert_eq!(encoder.url, "http://localhost:8080/rerank");
        assert_eq!(encoder.name(), DEFAULT_CROSS_ENCODER_MODEL);
    }
}
