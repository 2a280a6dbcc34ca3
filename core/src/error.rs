use crate::DocId;
use thiserror::Error;

/// Errors surfaced by the index and its postings stores.
///
/// Empty documents and unknown search terms are not errors; they come back as
/// `AddOutcome::Empty` and empty result sets.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The backend could not be reached (I/O failure, busy or locked database).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Document ids are positive; 0 is refused rather than indexed.
    #[error("invalid document id: {0}")]
    InvalidDocument(DocId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl From<rusqlite::Error> for IndexError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase
                | ErrorCode::ReadOnly => IndexError::BackendUnavailable(err.to_string()),
                _ => IndexError::Storage(err.to_string()),
            },
            _ => IndexError::Storage(err.to_string()),
        }
    }
}

impl From<sled::Error> for IndexError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(e) => IndexError::BackendUnavailable(e.to_string()),
            other => IndexError::Storage(other.to_string()),
        }
    }
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Snapshot(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Config(err.to_string())
    }
}
