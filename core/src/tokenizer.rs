use crate::config::{StopwordSource, TokenizerConfig};
use crate::error::{IndexError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fs;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\p{Alphabetic}\p{Nd}\s]+").expect("valid regex");
    static ref DIGITS: Regex = Regex::new(r"\d+").expect("valid regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid regex");
    static ref BUILTIN_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves",
            // articles and prepositions of the Spanish and French texts in the corpus
            "el","la","los","las","del","en","con","por","para","una","uno","que",
            "le","les","et","des","une","dans","pour","qui",
        ];
        words.iter().copied().collect()
    };
}

/// Text normalizer shared by indexing and querying.
///
/// A query term and an indexed term only match when both went through the same
/// `Tokenizer` configuration, so the index owns one instance and hands it to
/// the query side.
pub struct Tokenizer {
    min_len: usize,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<String>,
}

impl Tokenizer {
    pub fn new(config: &TokenizerConfig) -> Result<Self> {
        let raw: Vec<String> = match &config.stopwords {
            StopwordSource::Builtin => BUILTIN_STOPWORDS.iter().map(|w| w.to_string()).collect(),
            StopwordSource::Words(words) => words.clone(),
            StopwordSource::File(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| IndexError::Config(format!("stopwords {}: {e}", path.display())))?;
                text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect()
            }
            StopwordSource::None => Vec::new(),
        };
        // stopwords go through the same folding as text so "à" or "The" still match
        let stopwords = raw.iter().flat_map(|w| split_clean(&clean(w))).collect();
        let stemmer = config.stemming.then(|| Stemmer::create(Algorithm::English));
        Ok(Self { min_len: config.min_token_length, stemmer, stopwords })
    }

    pub fn is_stopword(&self, token: &str) -> bool { self.stopwords.contains(token) }

    /// Full pipeline, deduplicated in first-seen order.
    pub fn normalize_and_tokenize(&self, text: &str) -> Vec<String> {
        self.terms(text).collect()
    }

    /// Lossy decode: malformed UTF-8 becomes U+FFFD, which the cleaning step
    /// turns into a separator.
    pub fn tokenize_bytes(&self, bytes: &[u8]) -> Vec<String> {
        self.normalize_and_tokenize(&String::from_utf8_lossy(bytes))
    }

    /// Lazy form of [`Tokenizer::normalize_and_tokenize`].
    pub fn terms<'a>(&'a self, text: &str) -> impl Iterator<Item = String> + 'a {
        let cleaned = clean(text);
        let mut seen = HashSet::new();
        split_clean(&cleaned)
            .into_iter()
            .filter(move |t| self.keep(t))
            .map(move |t| self.stem(t))
            .filter(move |t| self.keep(t))
            .filter(move |t| seen.insert(t.clone()))
    }

    /// Normalizes a single query term. Only the first raw token is considered:
    /// if it is filtered out (stopword, too short) the result is `None` even
    /// when later tokens would survive.
    pub fn normalize_term(&self, term: &str) -> Option<String> {
        let first = split_clean(&clean(term)).into_iter().next()?;
        Some(first).filter(|t| self.keep(t)).map(|t| self.stem(t)).filter(|t| self.keep(t))
    }

    fn keep(&self, token: &str) -> bool {
        token.chars().count() >= self.min_len && !self.is_stopword(token)
    }

    fn stem(&self, token: String) -> String {
        match &self.stemmer {
            Some(stemmer) => stemmer.stem(&token).into_owned(),
            None => token,
        }
    }
}

/// Steps 1-3: accent folding, lowercasing, punctuation and digit removal.
fn clean(text: &str) -> String {
    let folded: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase();
    let no_punct = NON_WORD.replace_all(&folded, " ");
    let no_digits = DIGITS.replace_all(&no_punct, " ");
    WHITESPACE.replace_all(&no_digits, " ").trim().to_string()
}

/// Step 4: whitespace split, keeping purely alphabetic tokens.
fn split_clean(cleaned: &str) -> Vec<String> {
    cleaned
        .split(' ')
        .filter(|t| !t.is_empty() && t.chars().all(char::is_alphabetic))
        .map(String::from)
        .collect()
}
