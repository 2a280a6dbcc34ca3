use super::{check_doc_id, distinct, AddOutcome, IndexStats, PostingsStore};
use crate::config::BackendKind;
use crate::error::Result;
use crate::persist::{load_snapshot, now_rfc3339, save_snapshot, Snapshot, SNAPSHOT_VERSION};
use crate::DocId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::mem::size_of;
use std::path::{Path, PathBuf};

#[derive(Default)]
struct MemoryState {
    postings: HashMap<String, HashSet<DocId>>,
    documents: HashSet<DocId>,
    total_postings: u64,
}

/// Whole index in a map, optionally persisted as a single snapshot file.
///
/// Nothing reaches disk until `flush` or `close`; a crash loses everything
/// written since the last snapshot.
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { state: RwLock::new(MemoryState::default()), snapshot: None }
    }

    /// Loads `path` if it exists; later flushes write back to it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match load_snapshot(&path)? {
            Some(snap) => {
                let total_postings = snap.postings.values().map(|s| s.len() as u64).sum();
                tracing::info!(path = %path.display(), terms = snap.postings.len(), "snapshot loaded");
                MemoryState { postings: snap.postings, documents: snap.documents, total_postings }
            }
            None => MemoryState::default(),
        };
        Ok(Self { state: RwLock::new(state), snapshot: Some(path) })
    }

    fn heap_estimate(state: &MemoryState) -> u64 {
        let postings: usize = state
            .postings
            .iter()
            .map(|(term, docs)| size_of::<String>() + term.len() + docs.len() * size_of::<DocId>())
            .sum();
        (postings + state.documents.len() * size_of::<DocId>()) as u64
    }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl PostingsStore for MemoryStore {
    fn kind(&self) -> BackendKind { BackendKind::Memory }

    fn add_document(&self, doc_id: DocId, terms: &[String]) -> Result<AddOutcome> {
        check_doc_id(doc_id)?;
        let terms = distinct(terms);
        if terms.is_empty() {
            return Ok(AddOutcome::Empty);
        }
        let mut state = self.state.write();
        if !state.documents.insert(doc_id) {
            return Ok(AddOutcome::AlreadyIndexed);
        }
        let mut new_postings = 0;
        for term in terms {
            if state.postings.entry(term.to_string()).or_default().insert(doc_id) {
                new_postings += 1;
            }
        }
        state.total_postings += new_postings as u64;
        Ok(AddOutcome::Indexed { new_postings })
    }

    fn search_term(&self, term: &str) -> Result<HashSet<DocId>> {
        Ok(self.state.read().postings.get(term).cloned().unwrap_or_default())
    }

    fn postings_len(&self, term: &str) -> Result<usize> {
        Ok(self.state.read().postings.get(term).map_or(0, HashSet::len))
    }

    fn contains_document(&self, doc_id: DocId) -> Result<bool> {
        Ok(self.state.read().documents.contains(&doc_id))
    }

    fn get_stats(&self) -> Result<IndexStats> {
        let state = self.state.read();
        let on_disk = match &self.snapshot {
            Some(path) => std::fs::metadata(path).ok().map(|m| m.len()),
            None => None,
        };
        Ok(IndexStats {
            backend: BackendKind::Memory,
            document_count: state.documents.len() as u64,
            unique_term_count: state.postings.len() as u64,
            total_postings_count: state.total_postings,
            size_bytes: on_disk.unwrap_or_else(|| Self::heap_estimate(&state)),
        })
    }

    fn reset(&self) -> Result<()> {
        *self.state.write() = MemoryState::default();
        tracing::info!(backend = "memory", "index reset");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.snapshot else { return Ok(()) };
        let state = self.state.read();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: now_rfc3339(),
            postings: state.postings.clone(),
            documents: state.documents.clone(),
        };
        save_snapshot(path, &snapshot)?;
        tracing::debug!(path = %path.display(), terms = snapshot.postings.len(), "snapshot written");
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.flush()
    }
}
