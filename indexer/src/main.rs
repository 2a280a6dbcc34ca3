use anyhow::{bail, Context, Result};
use bookindex_core::{AddOutcome, BackendConfig, BackendKind, DocId, IndexConfig, IndexError, InvertedIndex, QueryEngine};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query an inverted index of book texts", long_about = None)]
struct Cli {
    /// JSON config file (tokenizer + backend)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backend override: memory, sqlite or sled
    #[arg(long, global = true)]
    backend: Option<String>,
    /// Storage path for the backend override (snapshot file, database file or sled directory)
    #[arg(long, global = true)]
    path: Option<PathBuf>,
    /// Disable stemming regardless of the config file
    #[arg(long, global = true, default_value_t = false)]
    no_stemming: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every book body found under a directory
    Build {
        /// Datalake directory holding `<id>.body.txt` or `<id>.txt` files
        #[arg(long)]
        input: PathBuf,
    },
    /// Conjunctive search; prints matching ids
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Print index statistics as JSON
    Stats,
    /// Drop every term and posting
    Reset,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BuildSummary {
    indexed: usize,
    already_indexed: usize,
    empty: usize,
    skipped: usize,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let index = InvertedIndex::open(&config).context("opening index")?;

    let result = match &cli.command {
        Commands::Build { input } => build(&index, input).map(|summary| {
            println!(
                "{}",
                serde_json::json!({
                    "indexed": summary.indexed,
                    "already_indexed": summary.already_indexed,
                    "empty": summary.empty,
                    "skipped": summary.skipped,
                })
            );
        }),
        Commands::Search { query } => {
            let ids = QueryEngine::new(&index).search_sorted(&query.join(" "))?;
            println!("{}", serde_json::to_string(&ids)?);
            Ok(())
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&index.get_index_stats()?)?);
            Ok(())
        }
        Commands::Reset => index.reset().map_err(Into::into),
    };
    // close even when the command failed so snapshots and sled buffers are written
    index.close()?;
    result
}

fn resolve_config(cli: &Cli) -> Result<IndexConfig> {
    let mut config = match &cli.config {
        Some(path) => IndexConfig::from_json_file(path)?,
        None => IndexConfig::default(),
    };
    if cli.no_stemming {
        config.tokenizer.stemming = false;
    }
    if let Some(name) = &cli.backend {
        let kind: BackendKind = name.parse()?;
        config.backend = match (kind, cli.path.clone()) {
            (BackendKind::Memory, Some(path)) => BackendConfig::Memory { snapshot: Some(path) },
            (BackendKind::Sqlite, Some(path)) => {
                BackendConfig::Sqlite { path, busy_timeout_ms: bookindex_core::config::DEFAULT_BUSY_TIMEOUT_MS }
            }
            (BackendKind::Sled, Some(path)) => BackendConfig::Sled { path },
            (kind, None) => bail!("--backend {kind} needs --path"),
        };
    } else if cli.path.is_some() {
        bail!("--path given without --backend");
    }
    // each command runs in its own process; an unsaved memory index would be lost on exit
    if matches!(config.backend, BackendConfig::Memory { snapshot: None }) {
        bail!("the memory backend needs a snapshot path (--backend memory --path FILE or \"snapshot\" in --config)");
    }
    Ok(config)
}

/// Leading digits of a datalake file name, for names like `1342.body.txt`,
/// `1342_body.txt` or `1342.txt`. Header files are ignored.
fn book_id(file_name: &str) -> Option<DocId> {
    let stem = file_name.strip_suffix(".txt")?;
    let digits: String = stem.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let rest = &stem[digits.len()..];
    if !(rest.is_empty() || rest.to_ascii_lowercase().contains("body")) {
        return None;
    }
    digits.parse().ok()
}

/// One path per book. Datalakes shard downloads by date, so the same id can
/// show up more than once; the lexicographically greatest path is the latest.
fn collect_books(input: &Path) -> Result<BTreeMap<DocId, PathBuf>> {
    if !input.is_dir() {
        bail!("{} is not a directory", input.display());
    }
    let mut books: BTreeMap<DocId, PathBuf> = BTreeMap::new();
    for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(id) = entry.file_name().to_str().and_then(book_id) else { continue };
        let path = entry.path().to_path_buf();
        match books.get(&id) {
            Some(existing) if *existing >= path => {}
            _ => {
                books.insert(id, path);
            }
        }
    }
    Ok(books)
}

fn build(index: &InvertedIndex, input: &Path) -> Result<BuildSummary> {
    let books = collect_books(input)?;
    tracing::info!(books = books.len(), input = %input.display(), "indexing");
    let mut summary = BuildSummary::default();
    for (id, path) in books {
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(id, path = %path.display(), error = %e, "unreadable book, skipping");
                summary.skipped += 1;
                continue;
            }
        };
        match index.index_book_bytes(id, &raw) {
            Ok(AddOutcome::Indexed { new_postings }) => {
                tracing::info!(id, new_postings, "book indexed");
                summary.indexed += 1;
            }
            Ok(AddOutcome::AlreadyIndexed) => summary.already_indexed += 1,
            Ok(AddOutcome::Empty) => {
                tracing::info!(id, "book has no indexable terms");
                summary.empty += 1;
            }
            Err(IndexError::InvalidDocument(id)) => {
                tracing::warn!(id, path = %path.display(), "invalid book id, skipping");
                summary.skipped += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("indexing book {id}")),
        }
    }
    index.flush()?;
    tracing::info!(?summary, "index build complete");
    Ok(summary)
}
