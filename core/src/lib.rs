//! Inverted index over book texts with pluggable postings storage.
//!
//! Text goes through one normalization pipeline ([`tokenizer::Tokenizer`]) for
//! both indexing and querying; postings live in a [`store::PostingsStore`]
//! chosen at construction time.

pub mod config;
pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod store;
pub mod tokenizer;

/// Externally assigned book id; always positive.
pub type DocId = u32;

pub use config::{BackendConfig, BackendKind, IndexConfig, StopwordSource, TokenizerConfig};
pub use error::{IndexError, Result};
pub use index::InvertedIndex;
pub use query::QueryEngine;
pub use store::{AddOutcome, IndexStats, PostingsStore};
pub use tokenizer::Tokenizer;
