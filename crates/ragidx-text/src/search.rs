use std::collections::HashSet;
use std::fmt;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::{TextAnalyzer, TokenStream};
use tantivy::{Searcher, TantivyDocument, Term};

use ragidx_core::types::{SearchHit, SourceKind};
use ragidx_core::{Error, Result};

/// Frozen, read-only view of the lexical index as of one commit.
///
/// Holding a view pins the segments it was opened on; later commits are
/// invisible to it.
#[derive(Clone)]
pub struct LexicalView {
    searcher: Searcher,
    id_field: Field,
    text_field: Field,
    analyzer: TextAnalyzer,
}

impl fmt::Debug for LexicalView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexicalView").field("len", &self.len()).finish_non_exhaustive()
    }
}

impl LexicalView {
    pub(crate) fn new(searcher: Searcher, id_field: Field, text_field: Field, analyzer: TextAnalyzer) -> Self {
        Self { searcher, id_field, text_field, analyzer }
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        usize::try_from(self.searcher.num_docs()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Analyzed, de-duplicated query terms in first-seen order.
    pub fn terms(&self, query: &str) -> Vec<String> {
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(query);
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        stream.process(&mut |token| {
            if seen.insert(token.text.clone()) {
                terms.push(token.text.clone());
            }
        });
        terms
    }

    /// BM25-ranked hits for any of the query's words. Scores are non-negative
    /// and unbounded; higher is better.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let terms = self.terms(query);
        if terms.is_empty() || k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|t| {
                let term = Term::from_field_text(self.text_field, t);
                (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let top_docs = self.searcher.search(&query, &TopDocs::with_limit(k)).map_err(Error::storage)?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = self.searcher.doc(addr).map_err(Error::storage)?;
            let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) else {
                return Err(Error::Corrupt("lexical entry without id".into()));
            };
            hits.push(SearchHit { id: id.to_string(), score, source: SourceKind::Text });
        }
        // Tantivy breaks score ties by doc address; ids give a stable order instead.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        Ok(hits)
    }
}
