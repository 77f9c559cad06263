//! Candidate scorer
//!
//! Tiers: `Exact` (normalized names identical), `Partial` (query has at least
//! two tokens and every token occurs in the normalized candidate), `None`.
//! Callers break ties between equal tiers by series confirmation.

use super::normalizer::{name_tokens, normalize_name};

/// Words too generic to confirm a series on their own
const SERIES_STOPWORDS: &[&str] = &["the", "and", "season", "movie", "part", "series"];

/// Name match strength, ordered `None < Partial < Exact`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    None,
    Partial,
    Exact,
}

impl MatchTier {
    /// True for `Partial` and `Exact`
    pub fn is_match(&self) -> bool {
        *self >= MatchTier::Partial
    }
}

/// Pre-normalized query name, reused across every candidate of a lookup
#[derive(Debug, Clone)]
pub struct NameQuery {
    normalized: String,
    words: Vec<String>,
}

impl NameQuery {
    pub fn new(name: &str) -> Self {
        let normalized = normalize_name(name);
        let words = normalized
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();
        Self { normalized, words }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Score one candidate name
    pub fn score(&self, candidate_name: &str) -> MatchTier {
        score(&self.normalized, candidate_name, &self.words)
    }

    /// Best tier over a candidate's primary and alternative names
    pub fn best_score<'a, I>(&self, names: I) -> MatchTier
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(|n| self.score(n))
            .max()
            .unwrap_or(MatchTier::None)
    }
}

/// Score `candidate_name` against an already normalized query
pub fn score(normalized_query: &str, candidate_name: &str, query_words: &[String]) -> MatchTier {
    if normalized_query.is_empty() {
        return MatchTier::None;
    }

    let candidate = normalize_name(candidate_name);
    if candidate == normalized_query {
        return MatchTier::Exact;
    }

    if query_words.len() >= 2 && query_words.iter().all(|w| candidate.contains(w.as_str())) {
        return MatchTier::Partial;
    }

    MatchTier::None
}

/// Distinctive tokens of a series guess
pub fn series_tokens(series_guess: &str) -> Vec<String> {
    name_tokens(series_guess)
        .into_iter()
        .filter(|t| t.chars().count() >= 3 && !SERIES_STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// True when any title in `series_titles` shares a token with the guess
pub fn series_confirmed(series_guess: Option<&str>, series_titles: &[String]) -> bool {
    let Some(guess) = series_guess else {
        return false;
    };
    let wanted = series_tokens(guess);
    if wanted.is_empty() {
        return false;
    }

    series_titles.iter().any(|title| {
        let title_tokens = name_tokens(title);
        wanted.iter().any(|w| title_tokens.contains(w))
    })
}
