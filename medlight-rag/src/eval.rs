//! Retrieval and answer quality evaluation against a labelled question set.
//!
//! [`Evaluator::evaluate`] scores retrieval with rank and set metrics;
//! [`Evaluator::evaluate_answers`] generates answers and has an [`LlmJudge`]
//! grade their faithfulness to the evidence and relevance to the question.
//!
//! The dataset layout is the one produced by the synthetic QA generation job:
//!
//! ```json
//! {
//!   "queries": { "q1": "What lowers LDL?" },
//!   "corpus": { "node-7": "Statins lower LDL cholesterol ..." },
//!   "relevant_docs": { "q1": ["node-7"] }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{RagError, Result};
use crate::llm::{ChatModel, ChatRequest, extract_json};
use crate::pipeline::RagPipeline;
use crate::source::ScoredSource;

const EPSILON: f64 = 1e-10;

/// Labelled questions and the passages that answer them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvalDataset {
    /// Question text by query id.
    pub queries: BTreeMap<String, String>,
    /// Passage text by source id.
    #[serde(default)]
    pub corpus: BTreeMap<String, String>,
    /// Ids of the relevant passages by query id.
    pub relevant_docs: BTreeMap<String, Vec<String>>,
}

impl EvalDataset {
    /// Parse a dataset from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Json`] if the text does not match the layout.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a dataset from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] or [`RagError::Json`] if the file cannot be
    /// read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Scores for one evaluated question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryMetrics {
    /// Query id from the dataset.
    pub query_id: String,
    /// Retrieved source ids, in evidence order.
    pub retrieved_ids: Vec<String>,
    /// Relevant source ids from the dataset.
    pub expected_ids: Vec<String>,
    /// 1 if any relevant passage was retrieved, else 0.
    pub hit_rate: f64,
    /// Reciprocal rank of the first relevant passage, 0 if none.
    pub mrr: f64,
    /// Share of retrieved passages that are relevant.
    pub precision: f64,
    /// Share of relevant passages that were retrieved.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Retrieved and relevant.
    pub true_positives: usize,
    /// Retrieved but not relevant.
    pub false_positives: usize,
    /// Relevant but not retrieved.
    pub false_negatives: usize,
}

/// Score one ranked retrieval against its relevant ids.
pub fn evaluate_retrieval(
    query_id: &str,
    retrieved_ids: &[String],
    expected_ids: &[String],
) -> QueryMetrics {
    let retrieved: HashSet<&str> = retrieved_ids.iter().map(String::as_str).collect();
    let expected: HashSet<&str> = expected_ids.iter().map(String::as_str).collect();

    let true_positives = retrieved.intersection(&expected).count();
    let false_positives = retrieved.difference(&expected).count();
    let false_negatives = expected.difference(&retrieved).count();

    let mrr = retrieved_ids
        .iter()
        .position(|id| expected.contains(id.as_str()))
        .map(|rank| 1.0 / (rank + 1) as f64)
        .unwrap_or(0.0);
    let hit_rate = if true_positives > 0 { 1.0 } else { 0.0 };

    let tp = true_positives as f64;
    let precision = tp / (tp + false_positives as f64 + EPSILON);
    let recall = tp / (tp + false_negatives as f64 + EPSILON);
    let f1 = 2.0 * (precision * recall) / (precision + recall + EPSILON);

    QueryMetrics {
        query_id: query_id.to_string(),
        retrieved_ids: retrieved_ids.to_vec(),
        expected_ids: expected_ids.to_vec(),
        hit_rate,
        mrr,
        precision,
        recall,
        f1,
        true_positives,
        false_positives,
        false_negatives,
    }
}

/// Mean scores across a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvalSummary {
    /// Number of evaluated questions.
    pub query_count: usize,
    /// Mean hit rate.
    pub hit_rate: f64,
    /// Mean reciprocal rank.
    pub mrr: f64,
    /// Mean precision.
    pub precision: f64,
    /// Mean recall.
    pub recall: f64,
    /// Mean F1.
    pub f1: f64,
}

impl EvalSummary {
    /// Average the per-question metrics.
    pub fn from_results(results: &[QueryMetrics]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let n = results.len() as f64;
        let mean = |f: fn(&QueryMetrics) -> f64| results.iter().map(f).sum::<f64>() / n;
        Self {
            query_count: results.len(),
            hit_rate: mean(|m| m.hit_rate),
            mrr: mean(|m| m.mrr),
            precision: mean(|m| m.precision),
            recall: mean(|m| m.recall),
            f1: mean(|m| m.f1),
        }
    }
}

/// Per-question metrics and their means.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalReport {
    /// Metrics in query id order.
    pub results: Vec<QueryMetrics>,
    /// Means across `results`.
    pub summary: EvalSummary,
}

/// Runs a dataset through a pipeline's retrieval stages.
pub struct Evaluator {
    pipeline: Arc<RagPipeline>,
}

impl Evaluator {
    /// Create an evaluator for `pipeline`.
    pub fn new(pipeline: Arc<RagPipeline>) -> Self {
        Self { pipeline }
    }

    /// Retrieve evidence for every question, in query id order, and score it.
    ///
    /// Evidence is ranked by score before scoring, so MRR reflects relevance
    /// order whether or not the pipeline reranks. Questions without relevance
    /// labels are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EvalError`] if the dataset has no labelled
    /// questions or a retrieval fails.
    pub async fn evaluate(&self, dataset: &EvalDataset) -> Result<EvalReport> {
        let mut results = Vec::with_capacity(dataset.queries.len());
        for (query_id, query) in &dataset.queries {
            let Some(expected) = dataset.relevant_docs.get(query_id) else {
                warn!(query_id = %query_id, "query has no relevance labels, skipping");
                continue;
            };

            let report = self.pipeline.retrieve(query).await.map_err(|e| {
                RagError::EvalError(format!("retrieval failed for query '{query_id}': {e}"))
            })?;
            let retrieved = ranked_ids(&report.evidence);
            results.push(evaluate_retrieval(query_id, &retrieved, expected));
        }

        if results.is_empty() {
            return Err(RagError::EvalError("dataset has no labelled queries".to_string()));
        }

        let summary = EvalSummary::from_results(&results);
        info!(
            query_count = summary.query_count,
            hit_rate = summary.hit_rate,
            mrr = summary.mrr,
            "evaluation completed"
        );
        Ok(EvalReport { results, summary })
    }

    /// Answer every question with `model`, in query id order, and have
    /// `judge` grade each answer against the evidence it was given.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EvalError`] if the dataset has no questions, or
    /// answering or judging any question fails.
    pub async fn evaluate_answers(
        &self,
        dataset: &EvalDataset,
        model: &str,
        judge: &LlmJudge,
    ) -> Result<AnswerReport> {
        if dataset.queries.is_empty() {
            return Err(RagError::EvalError("dataset has no queries".to_string()));
        }

        let mut results = Vec::with_capacity(dataset.queries.len());
        for (query_id, question) in &dataset.queries {
            let answer = self.pipeline.answer(question, model).await.map_err(|e| {
                RagError::EvalError(format!("answering failed for query '{query_id}': {e}"))
            })?;
            let judged = |e: RagError| {
                RagError::EvalError(format!("judging failed for query '{query_id}': {e}"))
            };
            let faithfulness =
                judge.faithfulness(&answer.text, &answer.context.text).await.map_err(judged)?;
            let relevancy = judge
                .relevancy(question, &answer.text, &answer.context.text)
                .await
                .map_err(judged)?;

            results.push(AnswerEvaluation {
                query_id: query_id.clone(),
                question: question.clone(),
                answer: answer.text,
                faithfulness,
                relevancy,
            });
        }

        let summary = AnswerSummary::from_results(&results);
        info!(
            query_count = summary.query_count,
            faithfulness = summary.faithfulness,
            relevancy = summary.relevancy,
            "answer evaluation completed"
        );
        Ok(AnswerReport { results, summary })
    }
}

fn ranked_ids(evidence: &[ScoredSource]) -> Vec<String> {
    let mut ranked: Vec<&ScoredSource> = evidence.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.into_iter().map(|c| c.id().to_string()).collect()
}

// ── answer evaluation ──────────────────────────────────────────────

/// Sampling temperature for judge calls.
pub const JUDGE_TEMPERATURE: f32 = 0.0;

/// A judge's decision on one criterion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    /// Whether the answer meets the criterion.
    pub passing: bool,
    /// 1.0 when passing, else 0.0.
    pub score: f64,
    /// The judge's reasoning.
    pub feedback: String,
}

/// Grades generated answers with a language model.
pub struct LlmJudge {
    model: Arc<dyn ChatModel>,
}

fn faithfulness_prompt(answer: &str, context: &str) -> String {
    format!(
        "Please tell if a given piece of information is supported by the context. Answer YES \
         if any of the context supports the information, even if most of the context is \
         unrelated, otherwise answer NO.\n\nInformation: {answer}\n\nContext:\n{context}\n\n\
         Respond with a JSON object of the form {{\"verdict\": \"YES\" or \"NO\", \
         \"reasoning\": \"...\"}}."
    )
}

fn relevancy_prompt(question: &str, answer: &str, context: &str) -> String {
    format!(
        "Your task is to evaluate if the response to the query is in line with the context \
         information provided. Answer YES if it is, otherwise answer NO.\n\nQuery: {question}\n\
         Response: {answer}\n\nContext:\n{context}\n\nRespond with a JSON object of the form \
         {{\"verdict\": \"YES\" or \"NO\", \"reasoning\": \"...\"}}."
    )
}

impl LlmJudge {
    /// Create a judge backed by `model`.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Whether `answer` is supported by `context`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EvalError`] if the model call fails or its reply
    /// carries no verdict.
    pub async fn faithfulness(&self, answer: &str, context: &str) -> Result<Verdict> {
        self.judge("faithfulness", faithfulness_prompt(answer, context)).await
    }

    /// Whether `answer` to `question` is in line with `context`.
    ///
    /// # Errors
    ///
    /// As for [`faithfulness`](Self::faithfulness).
    pub async fn relevancy(&self, question: &str, answer: &str, context: &str) -> Result<Verdict> {
        self.judge("relevancy", relevancy_prompt(question, answer, context)).await
    }

    async fn judge(&self, criterion: &str, prompt: String) -> Result<Verdict> {
        let request = ChatRequest::new().user(prompt).temperature(JUDGE_TEMPERATURE);
        let reply = self.model.complete(request).await.map_err(|e| {
            error!(model = self.model.name(), criterion, error = %e, "judge call failed");
            RagError::EvalError(format!("{criterion} judge call failed: {e}"))
        })?;
        parse_verdict(&reply)
    }
}

/// Parse a `{"verdict": "YES" | "NO", "reasoning": "..."}` judge reply.
///
/// # Errors
///
/// Returns [`RagError::EvalError`] if the reply has no YES/NO verdict.
pub fn parse_verdict(reply: &str) -> Result<Verdict> {
    let value = extract_json(reply)
        .ok_or_else(|| RagError::EvalError("judge reply contains no JSON".to_string()))?;
    let passing = match value.get("verdict").and_then(Value::as_str).map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("yes") => true,
        Some(v) if v.eq_ignore_ascii_case("no") => false,
        _ => return Err(RagError::EvalError("judge reply has no YES/NO verdict".to_string())),
    };
    let feedback =
        value.get("reasoning").and_then(Value::as_str).unwrap_or_default().trim().to_string();
    Ok(Verdict { passing, score: if passing { 1.0 } else { 0.0 }, feedback })
}

/// One judged answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerEvaluation {
    /// Query id from the dataset.
    pub query_id: String,
    /// The question.
    pub question: String,
    /// The generated answer.
    pub answer: String,
    /// Whether the answer is supported by its evidence.
    pub faithfulness: Verdict,
    /// Whether the answer is in line with the evidence for the question.
    pub relevancy: Verdict,
}

/// Pass rates across a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnswerSummary {
    /// Number of judged answers.
    pub query_count: usize,
    /// Share of faithful answers.
    pub faithfulness: f64,
    /// Share of relevant answers.
    pub relevancy: f64,
}

impl AnswerSummary {
    /// Average the per-answer verdicts.
    pub fn from_results(results: &[AnswerEvaluation]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let n = results.len() as f64;
        Self {
            query_count: results.len(),
            faithfulness: results.iter().map(|r| r.faithfulness.score).sum::<f64>() / n,
            relevancy: results.iter().map(|r| r.relevancy.score).sum::<f64>() / n,
        }
    }
}

/// Judged answers and their pass rates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerReport {
    /// Evaluations in query id order.
    pub results: Vec<AnswerEvaluation>,
    /// Pass rates across `results`.
    pub summary: AnswerSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rank_and_set_metrics() {
        let metrics = evaluate_retrieval("q1", &ids(&["x", "a", "y"]), &ids(&["a", "b"]));
        assert_eq!(metrics.mrr, 0.5);
        assert_eq!(metrics.hit_rate, 1.0);
        assert_eq!(metrics.true_positives, 1);
        assert_eq!(metrics.false_positives, 2);
        assert_eq!(metrics.false_negatives, 1);
        assert!((metrics.precision - 1.0 / 3.0).abs() < 1e-9);
        assert!((metrics.recall - 0.5).abs() < 1e-9);
        assert!((metrics.f1 - 0.4).abs() < 1e-9);
    }

    #[test]
    fn miss_scores_zero() {
        let metrics = evaluate_retrieval("q1", &ids(&["x"]), &ids(&["a"]));
        assert_eq!(metrics.mrr, 0.0);
        assert_eq!(metrics.hit_rate, 0.0);
        assert_eq!(metrics.f1, 0.0);
    }

    #[test]
    fn verdict_parses_case_insensitively() {
        let verdict =
            parse_verdict(r#"Sure. {"verdict": " yes ", "reasoning": "cited in [1]"}"#).unwrap();
        assert!(verdict.passing);
        assert_eq!(verdict.score, 1.0);
        assert_eq!(verdict.feedback, "cited in [1]");

        assert!(!parse_verdict(r#"{"verdict": "NO"}"#).unwrap().passing);
    }

    #[test]
    fn reply_without_verdict_is_an_error() {
        assert!(matches!(parse_verdict("YES"), Err(RagError::EvalError(_))));
        assert!(matches!(parse_verdict(r#"{"verdict": "maybe"}"#), Err(RagError::EvalError(_))));
    }

    #[test]
    fn unscored_evidence_ranks_by_score_keeping_ties_in_order() {
        let evidence = vec![
            ScoredSource::new(crate::Source::new("x", "x"), 0.2),
            ScoredSource::new(crate::Source::new("a", "a"), 0.7),
            ScoredSource::new(crate::Source::new("b", "b"), 0.2),
        ];
        assert_eq!(ranked_ids(&evidence), ids(&["a", "x", "b"]));
    }

    #[test]
    fn empty_retrieval_does_not_divide_by_zero() {
        let metrics = evaluate_retrieval("q1", &[], &ids(&["a"]));
        assert_eq!(metrics.precision, 0.0);
        assert!(metrics.f1.is_finite());
    }
}
