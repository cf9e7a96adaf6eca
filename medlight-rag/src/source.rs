//! Evidence units and their per-stage relevance scores.
//!
//! A [`Source`] is immutable once the index has produced it. Every stage that
//! assigns a relevance value (index lookup, reranking) does so on a
//! [`ScoredSource`] wrapper, so rescoring never aliases the evidence itself.

use serde::{Deserialize, Serialize};

/// One retrieved evidence passage with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    /// Identifier assigned by the index (chunk or node id). The dedup key.
    pub id: String,
    /// DOI of the originating article, empty when unknown.
    #[serde(default)]
    pub doi: String,
    /// File name of the originating document, empty when unknown.
    #[serde(default)]
    pub file_name: String,
    /// Page of the originating document, zero when unknown.
    #[serde(default)]
    pub page: u32,
    /// The evidence text handed to generation.
    pub content: String,
}

impl Source {
    /// Create a source with the given id and content and empty provenance.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doi: String::new(),
            file_name: String::new(),
            page: 0,
            content: content.into(),
        }
    }

    /// Set the DOI.
    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = doi.into();
        self
    }

    /// Set the originating file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Set the originating page.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// File name used in citations, without a trailing `.pdf`.
    pub fn citation_name(&self) -> &str {
        self.file_name.strip_suffix(".pdf").unwrap_or(&self.file_name)
    }
}

/// A [`Source`] paired with the relevance score assigned by one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredSource {
    /// The evidence passage.
    pub source: Source,
    /// Relevance score (higher is more relevant).
    pub score: f32,
}

impl ScoredSource {
    /// Pair a source with a score.
    pub fn new(source: Source, score: f32) -> Self {
        Self { source, score }
    }

    /// The id of the underlying source.
    pub fn id(&self) -> &str {
        &self.source.id
    }

    /// The evidence text of the underlying source.
    pub fn content(&self) -> &str {
        &self.source.content
    }

    /// A copy of this candidate carrying a different score.
    pub fn rescored(&self, score: f32) -> Self {
        Self { source: self.source.clone(), score }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_name_strips_pdf_extension() {
        let source = Source::new("n1", "text").with_file_name("smith2021.pdf");
        assert_eq!(source.citation_name(), "smith2021");

        let source = Source::new("n2", "text").with_file_name("notes.md");
        assert_eq!(source.citation_name(), "notes.md");
    }

    #[test]
    fn missing_provenance_deserializes_to_defaults() {
        let source: Source = serde_json::from_str(r#"{"id":"n1","content":"aspirin"}"#).unwrap();
        assert_eq!(source.doi, "");
        assert_eq!(source.file_name, "");
        assert_eq!(source.page, 0);
    }

    #[test]
    fn rescored_leaves_original_untouched() {
        let original = ScoredSource::new(Source::new("n1", "text"), 0.4);
        let copy = original.rescored(0.9);
        assert_eq!(original.score, 0.4);
        assert_eq!(copy.score, 0.9);
        assert_eq!(copy.source, original.source);
    }
}
