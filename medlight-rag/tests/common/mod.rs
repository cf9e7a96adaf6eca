//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use medlight_rag::{
    CandidateIndex, ChatModel, ChatRequest, CrossEncoder, EmbeddingProvider, RagError, Result,
    ScoredSource, SearchOptions, Source,
};

pub fn scored(id: &str, content: &str, score: f32) -> ScoredSource {
    ScoredSource::new(Source::new(id, content), score)
}

/// An index answering from a fixed table, failing for listed queries.
#[derive(Default)]
pub struct FakeIndex {
    results: HashMap<String, Vec<ScoredSource>>,
    failing: HashSet<String>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(String, usize)>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, results: Vec<ScoredSource>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }
}

#[async_trait]
impl CandidateIndex for FakeIndex {
    fn backend(&self) -> &str {
        "fake"
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredSource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((query.to_string(), options.similarity_top_k));
        if self.failing.contains(query) {
            return Err(RagError::IndexError {
                backend: "fake".into(),
                message: format!("lookup failed for '{query}'"),
            });
        }
        let mut results = self.results.get(query).cloned().unwrap_or_default();
        results.truncate(options.similarity_top_k);
        Ok(results)
    }
}

/// A chat model replying from a script, or always failing.
pub struct ScriptedModel {
    replies: Mutex<Vec<String>>,
    fail: bool,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    /// Replies are returned in order; the last one repeats.
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self { replies: Mutex::new(Vec::new()), fail: true, requests: Mutex::new(Vec::new()) }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(RagError::ModelError {
                model: "scripted".into(),
                message: "service unavailable".into(),
            });
        }
        let mut replies = self.replies.lock().unwrap();
        match replies.len() {
            0 => Ok(String::new()),
            1 => Ok(replies[0].clone()),
            _ => Ok(replies.pop().unwrap_or_default()),
        }
    }
}

/// A cross-encoder returning a fixed logit per passage text and recording
/// the queries it scored against.
pub struct TableEncoder {
    logits: HashMap<String, f32>,
    fail: bool,
    pub calls: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
}

impl TableEncoder {
    pub fn new(logits: &[(&str, f32)]) -> Self {
        Self {
            logits: logits.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new(&[]) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrossEncoder for TableEncoder {
    fn name(&self) -> &str {
        "table"
    }

    async fn predict(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(RagError::ModelError { model: "table".into(), message: "out of memory".into() });
        }
        Ok(passages.iter().map(|p| self.logits.get(*p).copied().unwrap_or(0.0)).collect())
    }
}

/// Embeds text as counts of a fixed vocabulary.
pub struct VocabularyEmbedder {
    vocabulary: Vec<&'static str>,
}

impl VocabularyEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self { vocabulary: vocabulary.to_vec() }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let terms = medlight_rag::tokenize(text);
        self.vocabulary
            .iter()
            .map(|word| terms.iter().filter(|t| t.as_str() == *word).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for VocabularyEmbedder {
    fn name(&self) -> &str {
        "vocabulary"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.vocabulary.len()
    }
}
