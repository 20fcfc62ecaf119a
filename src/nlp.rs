//! Text and address normalization.
//!
//! Two independent normalizers: the token pipeline (clean, tokenize, filter,
//! stem) applied to subjects and bodies, and the address normalizer applied
//! to participant addresses. Both are pure functions over shared read-only
//! state built once before the worker pool starts.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::Result;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use stop_words::{get, LANGUAGE};
use unicode_normalization::UnicodeNormalization;

/// Shortest token kept by the length filter (inclusive).
pub const MIN_TOKEN_LEN: usize = 4;

/// Longest token kept by the length filter (inclusive).
pub const MAX_TOKEN_LEN: usize = 16;

/// Token and address normalizer.
///
/// Construction compiles the cleaning regexes and loads the stopword set,
/// stemmer, and optional lexicon. Instances are immutable afterwards and
/// safe to share across worker threads without locking.
pub struct Normalizer {
    non_alpha_regex: Regex,
    extra_spaces_regex: Regex,
    stopwords: HashSet<String>,
    lexicon: Option<HashSet<String>>,
    stemmer: Stemmer,
}

impl Normalizer {
    /// Create a normalizer without a lexicon filter.
    pub fn new() -> Result<Self> {
        Self::with_lexicon(None::<&Path>)
    }

    /// Create a normalizer, optionally loading a lexicon word list.
    ///
    /// The lexicon file holds one known word per line; tokens absent from it
    /// are dropped during normalization. With no lexicon configured the
    /// check is disabled and every token passes.
    pub fn with_lexicon(lexicon_path: Option<impl AsRef<Path>>) -> Result<Self> {
        let non_alpha_regex = Regex::new(r"[^a-zA-Z]+")
            .map_err(|e| anyhow::anyhow!("Failed to compile non-alpha regex: {e}"))?;
        let extra_spaces_regex = Regex::new(r"\s{2,}")
            .map_err(|e| anyhow::anyhow!("Failed to compile spaces regex: {e}"))?;

        let stopwords: HashSet<String> = get(LANGUAGE::English)
            .iter()
            .map(ToString::to_string)
            .collect();

        let lexicon = match lexicon_path {
            Some(path) => Some(load_lexicon(path.as_ref())?),
            None => None,
        };

        let stemmer = Stemmer::create(Algorithm::English);

        Ok(Self {
            non_alpha_regex,
            extra_spaces_regex,
            stopwords,
            lexicon,
            stemmer,
        })
    }

    /// Normalize free text into the canonical token stream.
    ///
    /// Clean, lowercase, tokenize, filter by length and stopword/lexicon
    /// membership, then stem. Deterministic: the same input always yields
    /// the same tokens.
    #[must_use]
    pub fn normalize_text(&self, text: &str) -> Vec<String> {
        let cleaned = self.clean_text(text);

        cleaned
            .split_whitespace()
            .filter(|w| (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&w.len()))
            .filter(|w| !self.stopwords.contains(*w))
            .filter(|w| self.in_lexicon(w))
            .map(|w| self.stemmer.stem(w).into_owned())
            .collect()
    }

    /// Replace non-alphabetic runs with a single space, collapse whitespace,
    /// and lowercase.
    #[must_use]
    pub fn clean_text(&self, text: &str) -> String {
        let normalized = text.nfc().collect::<String>();

        let alpha_only = self.non_alpha_regex.replace_all(&normalized, " ");
        let collapsed = self.extra_spaces_regex.replace_all(&alpha_only, " ");

        collapsed.trim().to_lowercase()
    }

    fn in_lexicon(&self, word: &str) -> bool {
        match &self.lexicon {
            Some(lexicon) => lexicon.contains(word),
            None => true,
        }
    }
}

/// Normalize a raw address into its canonical form.
///
/// Keeps the address portion of a display-name/address pair, strips the
/// plus-alias suffix (first `+` up to the final `@`), and lowercases.
/// Total: malformed input yields a best-effort, possibly-empty string.
#[must_use]
pub fn normalize_address(raw: &str) -> String {
    let address = extract_address(raw);
    strip_plus_alias(&address).to_lowercase()
}

/// Count token frequencies.
#[must_use]
pub fn count_tokens(tokens: &[String]) -> std::collections::HashMap<String, i64> {
    let mut counts = std::collections::HashMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }
    counts
}

/// Pull the bare address out of `Display Name <user@domain>` forms.
fn extract_address(raw: &str) -> String {
    let trimmed = raw.trim();

    if let (Some(start), Some(end)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
        if end > start {
            return trimmed[start + 1..end].trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Remove everything from the first `+` up to (but not including) the final `@`.
fn strip_plus_alias(address: &str) -> String {
    let Some(at) = address.rfind('@') else {
        return address.to_string();
    };
    match address[..at].find('+') {
        Some(plus) => format!("{}{}", &address[..plus], &address[at..]),
        None => address.to_string(),
    }
}

fn load_lexicon(path: &Path) -> Result<HashSet<String>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read lexicon {}: {e}", path.display()))?;
    Ok(contents
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect())
}
