use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::store::{open_store, AddOutcome, IndexStats, PostingsStore};
use crate::tokenizer::Tokenizer;
use crate::DocId;
use std::collections::HashSet;

/// Tokenizer plus one postings backend.
///
/// Documents are immutable once indexed: indexing an id that already has
/// postings is reported as `AddOutcome::AlreadyIndexed` and changes nothing.
pub struct InvertedIndex {
    tokenizer: Tokenizer,
    store: Box<dyn PostingsStore>,
}

impl InvertedIndex {
    pub fn open(config: &IndexConfig) -> Result<Self> {
        let tokenizer = Tokenizer::new(&config.tokenizer)?;
        let store = open_store(&config.backend)?;
        Ok(Self::with_store(tokenizer, store))
    }

    pub fn with_store(tokenizer: Tokenizer, store: Box<dyn PostingsStore>) -> Self {
        Self { tokenizer, store }
    }

    pub fn tokenizer(&self) -> &Tokenizer { &self.tokenizer }

    pub fn index_book(&self, doc_id: DocId, raw_text: &str) -> Result<AddOutcome> {
        if doc_id == 0 {
            return Err(IndexError::InvalidDocument(doc_id));
        }
        let terms = self.tokenizer.normalize_and_tokenize(raw_text);
        self.add_terms(doc_id, &terms)
    }

    pub fn index_book_bytes(&self, doc_id: DocId, raw: &[u8]) -> Result<AddOutcome> {
        if doc_id == 0 {
            return Err(IndexError::InvalidDocument(doc_id));
        }
        let terms = self.tokenizer.tokenize_bytes(raw);
        self.add_terms(doc_id, &terms)
    }

    fn add_terms(&self, doc_id: DocId, terms: &[String]) -> Result<AddOutcome> {
        if terms.is_empty() {
            tracing::debug!(doc_id, "no terms survived normalization");
            return Ok(AddOutcome::Empty);
        }
        let outcome = self.store.add_document(doc_id, terms)?;
        tracing::debug!(doc_id, terms = terms.len(), ?outcome, "document processed");
        Ok(outcome)
    }

    pub fn is_indexed(&self, doc_id: DocId) -> Result<bool> {
        self.store.contains_document(doc_id)
    }

    /// Single-term lookup; the term is normalized exactly like indexed text.
    pub fn search(&self, term: &str) -> Result<HashSet<DocId>> {
        match self.tokenizer.normalize_term(term) {
            Some(t) => self.store.search_term(&t),
            None => Ok(HashSet::new()),
        }
    }

    /// Conjunctive search over every term of `raw_query`.
    pub fn multi_term_search(&self, raw_query: &str) -> Result<HashSet<DocId>> {
        let terms = self.tokenizer.normalize_and_tokenize(raw_query);
        self.intersect(&terms)
    }

    /// Intersects postings smallest set first and stops as soon as the
    /// running result is empty.
    pub(crate) fn intersect(&self, terms: &[String]) -> Result<HashSet<DocId>> {
        if terms.is_empty() {
            return Ok(HashSet::new());
        }
        let mut sized = Vec::with_capacity(terms.len());
        for term in terms {
            let len = self.store.postings_len(term)?;
            if len == 0 {
                return Ok(HashSet::new());
            }
            sized.push((len, term.as_str()));
        }
        sized.sort_unstable();

        let mut iter = sized.into_iter();
        let Some((_, first)) = iter.next() else { return Ok(HashSet::new()) };
        let mut result = self.store.search_term(first)?;
        for (_, term) in iter {
            if result.is_empty() {
                break;
            }
            let postings = self.store.search_term(term)?;
            result.retain(|doc| postings.contains(doc));
        }
        Ok(result)
    }

    pub fn get_index_stats(&self) -> Result<IndexStats> {
        self.store.get_stats()
    }

    pub fn reset(&self) -> Result<()> {
        self.store.reset()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn close(self) -> Result<()> {
        tracing::info!(backend = %self.store.kind(), "closing index");
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StopwordSource, TokenizerConfig};
    use crate::store::MemoryStore;

    fn whale_index() -> InvertedIndex {
        let config = TokenizerConfig {
            stemming: false,
            stopwords: StopwordSource::Words(vec!["the".into(), "and".into()]),
            ..TokenizerConfig::default()
        };
        let index = InvertedIndex::with_store(Tokenizer::new(&config).unwrap(), Box::new(MemoryStore::new()));
        index.index_book(1, "The Whale and the Sea").unwrap();
        index.index_book(2, "The Sea and the Storm").unwrap();
        index
    }

    #[test]
    fn zero_doc_id_is_refused() {
        let index = whale_index();
        assert!(matches!(index.index_book(0, "whale"), Err(IndexError::InvalidDocument(0))));
        assert!(matches!(index.index_book_bytes(0, b"whale"), Err(IndexError::InvalidDocument(0))));
    }

    #[test]
    fn stopword_only_document_is_empty() {
        let index = whale_index();
        assert_eq!(index.index_book(3, "the and THE").unwrap(), AddOutcome::Empty);
        assert!(!index.is_indexed(3).unwrap());
    }

    #[test]
    fn intersection_short_circuits_on_unknown_term() {
        let index = whale_index();
        assert!(index.multi_term_search("sea zzzznotaword").unwrap().is_empty());
    }

    #[test]
    fn search_normalizes_query_term() {
        let index = whale_index();
        assert_eq!(index.search("  SEA! ").unwrap(), [1, 2].into_iter().collect::<HashSet<_>>());
        assert!(index.search("the").unwrap().is_empty());
    }
}
