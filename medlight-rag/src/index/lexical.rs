//! BM25 search for the sparse retrieval signal, built on tantivy.

use std::fmt;

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, STRING, Schema, TEXT, Value};
use tantivy::tokenizer::{
    LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, TokenStream,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term, doc};
use tracing::debug;

use crate::error::{RagError, Result};

const BACKEND: &str = "tantivy";
const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Split text into lowercase alphanumeric terms, the way passages are
/// indexed for BM25.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build();
    let mut stream = analyzer.token_stream(text);
    let mut terms = Vec::new();
    stream.process(&mut |token| terms.push(token.text.clone()));
    terms
}

fn index_error(e: impl fmt::Display) -> RagError {
    RagError::IndexError { backend: BACKEND.to_string(), message: e.to_string() }
}

/// A RAM-resident tantivy index of passage text keyed by passage id.
pub(crate) struct LexicalIndex {
    index: Index,
    f_id: Field,
    f_content: Field,
}

impl fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexicalIndex").finish_non_exhaustive()
    }
}

impl Default for LexicalIndex {
    fn default() -> Self {
        let mut schema_builder = Schema::builder();
        let f_id = schema_builder.add_text_field("id", STRING | STORED);
        let f_content = schema_builder.add_text_field("content", TEXT);
        let index = Index::create_in_ram(schema_builder.build());
        Self { index, f_id, f_content }
    }
}

impl LexicalIndex {
    /// Index `(id, text)` pairs, replacing any passage already stored under
    /// the same id.
    pub(crate) fn upsert<'a>(
        &self,
        passages: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<()> {
        let mut writer: IndexWriter =
            self.index.writer_with_num_threads(1, WRITER_MEMORY_BYTES).map_err(index_error)?;

        for (id, text) in passages {
            writer.delete_term(Term::from_field_text(self.f_id, id));
            writer
                .add_document(doc!(
                    self.f_id => id.to_string(),
                    self.f_content => text.to_string(),
                ))
                .map_err(index_error)?;
        }

        writer.commit().map_err(index_error)?;
        Ok(())
    }

    /// Ids and BM25 scores of the `limit` best passages matching any query
    /// term.
    ///
    /// Query syntax errors are ignored: the query is parsed leniently so
    /// free text such as `COVID-19: "severe` still searches.
    pub(crate) fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let reader: IndexReader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(index_error)?;
        let searcher = reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![self.f_content]);
        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            debug!(error_count = errors.len(), "ignored query syntax errors");
        }

        let top_docs =
            searcher.search(&*parsed, &TopDocs::with_limit(limit)).map_err(index_error)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address).map_err(index_error)?;
            if let Some(id) = doc.get_first(self.f_id).and_then(|v| v.as_str()) {
                hits.push((id.to_string(), score));
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(hits: &[(String, f32)]) -> Vec<&str> {
        hits.iter().map(|(id, _)| id.as_str()).collect()
    }

    #[test]
    fn tokenize_lowercases_and_splits_on_punctuation() {
        assert_eq!(tokenize("ACE-inhibitors & a BP drop!"), vec![
            "ace",
            "inhibitors",
            "a",
            "bp",
            "drop"
        ]);
    }

    #[test]
    fn matching_passage_outscores_partial_match() {
        let index = LexicalIndex::default();
        index
            .upsert([
                ("a", "metformin lowers blood glucose in type 2 diabetes"),
                ("b", "blood pressure guidelines for adults"),
                ("c", "vaccination schedules for children"),
            ])
            .unwrap();

        let hits = index.search("metformin blood glucose", 10).unwrap();
        assert_eq!(ids(&hits), vec!["a", "b"]);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn replacing_a_passage_drops_its_old_terms() {
        let index = LexicalIndex::default();
        index.upsert([("a", "statin therapy")]).unwrap();
        index.upsert([("a", "insulin therapy")]).unwrap();

        assert!(index.search("statin", 5).unwrap().is_empty());
        assert_eq!(ids(&index.search("therapy", 5).unwrap()), vec!["a"]);
    }

    #[test]
    fn malformed_query_syntax_still_searches() {
        let index = LexicalIndex::default();
        index.upsert([("a", "severe covid pneumonia")]).unwrap();

        assert!(index.search("COVID-19: \"severe", 5).is_ok());
        assert_eq!(ids(&index.search("severe covid", 5).unwrap()), vec!["a"]);
    }

    #[test]
    fn zero_limit_or_empty_index_returns_nothing() {
        let index = LexicalIndex::default();
        assert!(index.search("statin", 5).unwrap().is_empty());
        index.upsert([("a", "statin")]).unwrap();
        assert!(index.search("statin", 0).unwrap().is_empty());
    }
}
