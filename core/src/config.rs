use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MIN_TOKEN_LENGTH: usize = 3;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub tokenizer: TokenizerConfig,
    pub backend: BackendConfig,
}

impl IndexConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| IndexError::Config(format!("{}: {e}", path.as_ref().display())))?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub min_token_length: usize,
    pub stemming: bool,
    pub stopwords: StopwordSource,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self { min_token_length: DEFAULT_MIN_TOKEN_LENGTH, stemming: true, stopwords: StopwordSource::Builtin }
    }
}

/// Where the stopword set comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopwordSource {
    #[default]
    Builtin,
    /// One word per line; blank lines are ignored.
    File(PathBuf),
    Words(Vec<String>),
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory {
        #[serde(default)]
        snapshot: Option<PathBuf>,
    },
    Sqlite {
        path: PathBuf,
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
    Sled {
        path: PathBuf,
    },
}

fn default_busy_timeout_ms() -> u64 { DEFAULT_BUSY_TIMEOUT_MS }

impl Default for BackendConfig {
    fn default() -> Self { BackendConfig::Memory { snapshot: None } }
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Memory { .. } => BackendKind::Memory,
            BackendConfig::Sqlite { .. } => BackendKind::Sqlite,
            BackendConfig::Sled { .. } => BackendKind::Sled,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Sqlite,
    Sled,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Sled => "sled",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "file" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            "sled" => Ok(BackendKind::Sled),
            other => Err(IndexError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_pipeline() {
        let cfg = IndexConfig::default();
        assert_eq!(cfg.tokenizer.min_token_length, 3);
        assert!(cfg.tokenizer.stemming);
        assert_eq!(cfg.tokenizer.stopwords, StopwordSource::Builtin);
        assert_eq!(cfg.backend.kind(), BackendKind::Memory);
    }

    #[test]
    fn parses_tagged_backend() {
        let json = r#"{
            "tokenizer": { "stemming": false, "stopwords": { "words": ["the", "and"] } },
            "backend": { "kind": "sqlite", "path": "/tmp/index.db" }
        }"#;
        let cfg: IndexConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.tokenizer.stemming);
        assert_eq!(cfg.tokenizer.min_token_length, 3);
        assert_eq!(cfg.tokenizer.stopwords, StopwordSource::Words(vec!["the".into(), "and".into()]));
        assert_eq!(
            cfg.backend,
            BackendConfig::Sqlite { path: PathBuf::from("/tmp/index.db"), busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS }
        );
    }

    #[test]
    fn backend_kind_from_str() {
        assert_eq!("SLED".parse::<BackendKind>().unwrap(), BackendKind::Sled);
        assert!("mongo".parse::<BackendKind>().is_err());
    }
}
