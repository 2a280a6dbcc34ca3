use crate::error::Result;
use crate::index::InvertedIndex;
use crate::DocId;
use std::collections::HashSet;

/// Free-text conjunctive queries against an index.
pub struct QueryEngine<'a> {
    index: &'a InvertedIndex,
}

impl<'a> QueryEngine<'a> {
    pub fn new(index: &'a InvertedIndex) -> Self {
        Self { index }
    }

    /// Documents containing every term of `query`. Empty or stopword-only
    /// queries match nothing.
    pub fn search(&self, query: &str) -> Result<HashSet<DocId>> {
        let terms = self.index.tokenizer().normalize_and_tokenize(query);
        if terms.is_empty() {
            tracing::debug!(query, "query has no searchable terms");
            return Ok(HashSet::new());
        }
        self.index.intersect(&terms)
    }

    /// Like [`QueryEngine::search`], ids in ascending order.
    pub fn search_sorted(&self, query: &str) -> Result<Vec<DocId>> {
        let mut ids: Vec<DocId> = self.search(query)?.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn search_single_term(&self, term: &str) -> Result<HashSet<DocId>> {
        self.index.search(term)
    }
}
