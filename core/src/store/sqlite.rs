use super::{check_doc_id, distinct, AddOutcome, IndexStats, PostingsStore};
use crate::config::BackendKind;
use crate::error::{IndexError, Result};
use crate::DocId;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS terms (
        term_id INTEGER PRIMARY KEY AUTOINCREMENT,
        term    TEXT UNIQUE NOT NULL
    );
    CREATE TABLE IF NOT EXISTS postings (
        term_id INTEGER NOT NULL REFERENCES terms(term_id),
        doc_id  INTEGER NOT NULL,
        PRIMARY KEY (term_id, doc_id)
    );
    CREATE INDEX IF NOT EXISTS idx_postings_term ON postings(term_id);
    CREATE INDEX IF NOT EXISTS idx_postings_doc ON postings(doc_id);
";

/// Two-table relational index: `terms` and `postings`.
///
/// One `IMMEDIATE` transaction per document, so a document is either fully
/// committed or absent after a crash. WAL mode lets readers in other
/// connections proceed during a write.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, busy_timeout)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, Duration::from_secs(5))
    }

    fn init(conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(journal_mode = %mode, "sqlite schema ready");
        Ok(Self { conn: Mutex::new(conn) })
    }
}

/// Returns the id of `term`, creating the row when needed. Two writers may race
/// to create the same term; the loser hits the UNIQUE constraint and reads the
/// winner's row instead.
fn ensure_term(tx: &Transaction<'_>, term: &str) -> Result<i64> {
    let inserted = tx
        .prepare_cached("INSERT INTO terms (term) VALUES (?1) RETURNING term_id")?
        .query_row(params![term], |row| row.get(0));
    match inserted {
        Ok(id) => Ok(id),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            tracing::trace!(term, "term exists, re-reading");
            let id = tx
                .prepare_cached("SELECT term_id FROM terms WHERE term = ?1")?
                .query_row(params![term], |row| row.get(0))?;
            Ok(id)
        }
        Err(e) => Err(e.into()),
    }
}

impl PostingsStore for SqliteStore {
    fn kind(&self) -> BackendKind { BackendKind::Sqlite }

    fn add_document(&self, doc_id: DocId, terms: &[String]) -> Result<AddOutcome> {
        check_doc_id(doc_id)?;
        let terms = distinct(terms);
        if terms.is_empty() {
            return Ok(AddOutcome::Empty);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists = tx
            .prepare_cached("SELECT 1 FROM postings WHERE doc_id = ?1 LIMIT 1")?
            .query_row(params![doc_id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            return Ok(AddOutcome::AlreadyIndexed);
        }
        let mut new_postings = 0;
        for term in terms {
            let term_id = ensure_term(&tx, term)?;
            new_postings += tx
                .prepare_cached("INSERT OR IGNORE INTO postings (term_id, doc_id) VALUES (?1, ?2)")?
                .execute(params![term_id, doc_id])?;
        }
        tx.commit()?;
        Ok(AddOutcome::Indexed { new_postings })
    }

    fn search_term(&self, term: &str) -> Result<HashSet<DocId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT p.doc_id FROM postings p JOIN terms t ON p.term_id = t.term_id WHERE t.term = ?1",
        )?;
        let rows = stmt.query_map(params![term], |row| row.get::<_, DocId>(0))?;
        let mut docs = HashSet::new();
        for doc in rows {
            docs.insert(doc?);
        }
        Ok(docs)
    }

    fn postings_len(&self, term: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .prepare_cached(
                "SELECT COUNT(*) FROM postings p JOIN terms t ON p.term_id = t.term_id WHERE t.term = ?1",
            )?
            .query_row(params![term], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn contains_document(&self, doc_id: DocId) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .prepare_cached("SELECT 1 FROM postings WHERE doc_id = ?1 LIMIT 1")?
            .query_row(params![doc_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn get_stats(&self) -> Result<IndexStats> {
        let conn = self.conn.lock();
        let (terms, postings, docs): (i64, i64, i64) = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM terms),
                    (SELECT COUNT(*) FROM postings),
                    (SELECT COUNT(DISTINCT doc_id) FROM postings)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let page_count: i64 = conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
        let page_size: i64 = conn.pragma_query_value(None, "page_size", |row| row.get(0))?;
        Ok(IndexStats {
            backend: BackendKind::Sqlite,
            document_count: docs as u64,
            unique_term_count: terms as u64,
            total_postings_count: postings as u64,
            size_bytes: (page_count * page_size) as u64,
        })
    }

    fn reset(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM postings", [])?;
        tx.execute("DELETE FROM terms", [])?;
        tx.commit()?;
        tracing::info!(backend = "sqlite", "index reset");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // committed transactions are already durable; fold the WAL back into the main file
        let conn = self.conn.lock();
        conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(())).optional()?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let conn = self.conn.into_inner();
        conn.close().map_err(|(_, e)| IndexError::from(e))
    }
}
