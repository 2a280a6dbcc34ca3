use super::{check_doc_id, distinct, AddOutcome, IndexStats, PostingsStore};
use crate::config::BackendKind;
use crate::error::Result;
use crate::DocId;
use sled::{Db, Tree};
use std::collections::HashSet;
use std::path::Path;

const TERMS_TREE: &str = "terms";
const DOCUMENTS_TREE: &str = "documents";
const META_TREE: &str = "meta";

const DOC_COUNT: &[u8] = b"document_count";
const TERM_COUNT: &[u8] = b"unique_term_count";
const POSTING_COUNT: &[u8] = b"total_postings_count";

/// Document store with one record per term.
///
/// `terms` maps a term to its postings, encoded as sorted little-endian `u32`
/// ids. Keys are unique, so two writers creating the same term converge on one
/// record. Each term is updated by an atomic add-to-set; there is no
/// cross-term transaction, so a crash mid-document can leave some of its
/// terms written.
///
/// A document is claimed in `documents` before its terms are written. When a
/// write fails the claim is released so the document can be retried; the
/// term and posting counters still count what did land, and the retry only
/// counts the postings it adds.
pub struct SledStore {
    db: Db,
    terms: Tree,
    documents: Tree,
    meta: Tree,
    #[cfg(test)]
    fail_on_term: parking_lot::Mutex<Option<String>>,
}

fn decode(bytes: &[u8]) -> Vec<DocId> {
    bytes.chunks_exact(4).map(|c| DocId::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn encode(ids: &[DocId]) -> Vec<u8> {
    ids.iter().flat_map(|id| id.to_le_bytes()).collect()
}

/// Inserts `doc_id` into an encoded postings list, keeping it sorted.
fn add_to_set(old: Option<&[u8]>, doc_id: DocId) -> Vec<u8> {
    let mut ids = old.map(decode).unwrap_or_default();
    if let Err(pos) = ids.binary_search(&doc_id) {
        ids.insert(pos, doc_id);
    }
    encode(&ids)
}

fn read_counter(value: Option<&[u8]>) -> u64 {
    value
        .and_then(|v| <[u8; 8]>::try_from(v).ok())
        .map(u64::from_le_bytes)
        .unwrap_or(0)
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// Non-persistent instance, used by tests.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let terms = db.open_tree(TERMS_TREE)?;
        let documents = db.open_tree(DOCUMENTS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self {
            db,
            terms,
            documents,
            meta,
            #[cfg(test)]
            fail_on_term: parking_lot::Mutex::new(None),
        })
    }

    /// Adds `doc_id` to one term's postings. Returns `(new_term, new_posting)`.
    fn add_posting(&self, term: &str, doc_id: DocId) -> Result<(bool, bool)> {
        #[cfg(test)]
        {
            if self.fail_on_term.lock().as_deref() == Some(term) {
                return Err(crate::error::IndexError::Storage(format!("write to term {term} failed")));
            }
        }
        let old = self.terms.fetch_and_update(term.as_bytes(), |old| Some(add_to_set(old, doc_id)))?;
        Ok(match old {
            None => (true, true),
            Some(prev) => (false, decode(&prev).binary_search(&doc_id).is_err()),
        })
    }

    /// Writes every posting of a claimed document. Counters are bumped for the
    /// postings that were written even when a later term fails.
    fn write_postings(&self, doc_id: DocId, terms: &[&str]) -> Result<usize> {
        let (mut new_terms, mut new_postings) = (0u64, 0usize);
        let mut written = Ok(());
        for term in terms {
            match self.add_posting(term, doc_id) {
                Ok((new_term, new_posting)) => {
                    new_terms += new_term as u64;
                    new_postings += new_posting as usize;
                }
                Err(e) => {
                    written = Err(e);
                    break;
                }
            }
        }
        self.bump(TERM_COUNT, new_terms)?;
        self.bump(POSTING_COUNT, new_postings as u64)?;
        written?;
        self.bump(DOC_COUNT, 1)?;
        Ok(new_postings)
    }

    fn bump(&self, key: &[u8], delta: u64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        self.meta.fetch_and_update(key, |old| {
            let n = read_counter(old) + delta;
            Some(n.to_le_bytes().to_vec())
        })?;
        Ok(())
    }

    fn counter(&self, key: &[u8]) -> Result<u64> {
        Ok(read_counter(self.meta.get(key)?.as_deref()))
    }
}

impl PostingsStore for SledStore {
    fn kind(&self) -> BackendKind { BackendKind::Sled }

    fn add_document(&self, doc_id: DocId, terms: &[String]) -> Result<AddOutcome> {
        check_doc_id(doc_id)?;
        let terms = distinct(terms);
        if terms.is_empty() {
            return Ok(AddOutcome::Empty);
        }
        // claim the document first: only one writer wins the swap from absent
        let claim = self.documents.compare_and_swap(
            doc_id.to_be_bytes(),
            None as Option<&[u8]>,
            Some((terms.len() as u64).to_le_bytes().to_vec()),
        )?;
        if claim.is_err() {
            return Ok(AddOutcome::AlreadyIndexed);
        }
        match self.write_postings(doc_id, &terms) {
            Ok(new_postings) => Ok(AddOutcome::Indexed { new_postings }),
            Err(e) => {
                if let Err(release) = self.documents.remove(doc_id.to_be_bytes()) {
                    tracing::warn!(doc_id, error = %release, "could not release document claim");
                }
                tracing::warn!(doc_id, error = %e, "document write failed, claim released");
                Err(e)
            }
        }
    }

    fn search_term(&self, term: &str) -> Result<HashSet<DocId>> {
        Ok(self.terms.get(term.as_bytes())?.map(|v| decode(&v).into_iter().collect()).unwrap_or_default())
    }

    fn postings_len(&self, term: &str) -> Result<usize> {
        Ok(self.terms.get(term.as_bytes())?.map_or(0, |v| v.len() / 4))
    }

    fn contains_document(&self, doc_id: DocId) -> Result<bool> {
        Ok(self.documents.contains_key(doc_id.to_be_bytes())?)
    }

    fn get_stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            backend: BackendKind::Sled,
            document_count: self.counter(DOC_COUNT)?,
            unique_term_count: self.counter(TERM_COUNT)?,
            total_postings_count: self.counter(POSTING_COUNT)?,
            size_bytes: self.db.size_on_disk()?,
        })
    }

    fn reset(&self) -> Result<()> {
        self.terms.clear()?;
        self.documents.clear()?;
        self.meta.clear()?;
        self.db.flush()?;
        tracing::info!(backend = "sled", "index reset");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let bytes = self.db.flush()?;
        tracing::debug!(bytes, "sled flushed");
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use std::sync::Arc;
    use std::thread;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_to_set_is_sorted_and_unique() {
        let v = add_to_set(None, 5);
        let v = add_to_set(Some(v.as_slice()), 2);
        let v = add_to_set(Some(v.as_slice()), 5);
        assert_eq!(decode(&v), vec![2, 5]);
    }

    #[test]
    fn counters_track_writes() {
        let store = SledStore::temporary().unwrap();
        store.add_document(1, &terms(&["whale", "sea"])).unwrap();
        store.add_document(2, &terms(&["sea", "storm"])).unwrap();
        store.add_document(2, &terms(&["sea", "storm"])).unwrap();
        let stats = store.get_stats().unwrap();
        assert_eq!((stats.document_count, stats.unique_term_count, stats.total_postings_count), (2, 3, 4));
        assert_eq!(store.postings_len("sea").unwrap(), 2);
    }

    #[test]
    fn concurrent_first_insert_of_same_term() {
        let store = Arc::new(SledStore::temporary().unwrap());
        let handles: Vec<_> = (1..=8u32)
            .map(|doc| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.add_document(doc, &terms(&["leviathan"])).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.search_term("leviathan").unwrap(), (1..=8).collect::<HashSet<_>>());
        let stats = store.get_stats().unwrap();
        assert_eq!((stats.unique_term_count, stats.total_postings_count), (1, 8));
    }

    #[test]
    fn failed_write_releases_claim() {
        let store = SledStore::temporary().unwrap();
        *store.fail_on_term.lock() = Some("storm".into());
        let doc = terms(&["whale", "sea", "storm"]);
        assert!(matches!(store.add_document(1, &doc), Err(IndexError::Storage(_))));
        assert!(!store.contains_document(1).unwrap());
        let stats = store.get_stats().unwrap();
        assert_eq!((stats.document_count, stats.unique_term_count, stats.total_postings_count), (0, 2, 2));

        *store.fail_on_term.lock() = None;
        assert_eq!(store.add_document(1, &doc).unwrap(), AddOutcome::Indexed { new_postings: 1 });
        assert!(store.contains_document(1).unwrap());
        assert_eq!(store.search_term("storm").unwrap(), HashSet::from([1]));
        let stats = store.get_stats().unwrap();
        assert_eq!((stats.document_count, stats.unique_term_count, stats.total_postings_count), (1, 3, 3));
        assert_eq!(store.add_document(1, &doc).unwrap(), AddOutcome::AlreadyIndexed);
    }

    #[test]
    fn reset_clears_counters() {
        let store = SledStore::temporary().unwrap();
        store.add_document(1, &terms(&["whale"])).unwrap();
        store.reset().unwrap();
        let stats = store.get_stats().unwrap();
        assert_eq!((stats.document_count, stats.unique_term_count), (0, 0));
        assert!(!store.contains_document(1).unwrap());
    }
}
