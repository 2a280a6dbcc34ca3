//! Postings storage backends.
//!
//! Every backend keeps the same contract: a term maps to a set of document ids,
//! documents are immutable once they contributed postings, and stats are read
//! from counters or aggregate queries rather than a scan of the postings.

mod memory;
mod sled_store;
mod sqlite;

pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use sqlite::SqliteStore;

use crate::config::{BackendConfig, BackendKind};
use crate::error::{IndexError, Result};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Result of adding one document's term set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Indexed { new_postings: usize },
    /// The document already has postings; nothing was written.
    AlreadyIndexed,
    /// No term survived normalization.
    Empty,
}

impl AddOutcome {
    /// True when this call wrote postings.
    pub fn contributed(&self) -> bool { matches!(self, AddOutcome::Indexed { .. }) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub backend: BackendKind,
    pub document_count: u64,
    pub unique_term_count: u64,
    pub total_postings_count: u64,
    /// Bytes on disk for the persistent backends, snapshot or heap estimate for memory.
    pub size_bytes: u64,
}

pub trait PostingsStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Adds `(term, doc_id)` for every distinct term. A document that already
    /// has postings is left untouched.
    fn add_document(&self, doc_id: DocId, terms: &[String]) -> Result<AddOutcome>;

    fn search_term(&self, term: &str) -> Result<HashSet<DocId>>;

    fn postings_len(&self, term: &str) -> Result<usize> {
        Ok(self.search_term(term)?.len())
    }

    fn contains_document(&self, doc_id: DocId) -> Result<bool>;

    fn get_stats(&self) -> Result<IndexStats>;

    /// Drops every term and posting.
    fn reset(&self) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn close(self: Box<Self>) -> Result<()>;
}

pub fn open_store(config: &BackendConfig) -> Result<Box<dyn PostingsStore>> {
    let store: Box<dyn PostingsStore> = match config {
        BackendConfig::Memory { snapshot: Some(path) } => Box::new(MemoryStore::open(path)?),
        BackendConfig::Memory { snapshot: None } => Box::new(MemoryStore::new()),
        BackendConfig::Sqlite { path, busy_timeout_ms } => {
            Box::new(SqliteStore::open(path, Duration::from_millis(*busy_timeout_ms))?)
        }
        BackendConfig::Sled { path } => Box::new(SledStore::open(path)?),
    };
    tracing::info!(backend = %store.kind(), "postings store opened");
    Ok(store)
}

/// Document ids are positive; every backend refuses 0 before touching storage.
pub(crate) fn check_doc_id(doc_id: DocId) -> Result<()> {
    if doc_id == 0 {
        return Err(IndexError::InvalidDocument(doc_id));
    }
    Ok(())
}

/// Distinct terms of a document, first-seen order.
pub(crate) fn distinct(terms: &[String]) -> Vec<&str> {
    let mut seen = HashSet::with_capacity(terms.len());
    terms.iter().map(String::as_str).filter(|t| seen.insert(*t)).collect()
}
