//! Lexical retrieval: token-overlap scoring over stored chunks.
//!
//! The scorer is a deliberately naive bag-of-words substring counter. It
//! does no term weighting and no length normalization, and it matches
//! inside larger words (`"cat"` scores inside `"category"`).
//!
//! # Scoring Algorithm
//!
//! 1. Split the query on whitespace, lower-case each token, and drop
//!    tokens of two characters or fewer.
//! 2. No tokens left → no results.
//! 3. `score(chunk) = Σ count(token in lower(chunk.text))`, counting
//!    non-overlapping occurrences.
//! 4. Stable sort by score, descending; ties keep insertion order.
//! 5. Keep at most `top_k` chunks, all with score > 0.

use crate::models::{Chunk, SearchHit};

/// Tokens of one character or two are ignored.
const MIN_TOKEN_CHARS: usize = 3;

/// Split a query into lower-cased scoring tokens.
///
/// Duplicates are kept, so a repeated word weighs twice.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// Sum of token occurrence counts inside `text`, case-insensitively.
pub fn score_text(tokens: &[String], text: &str) -> usize {
    let haystack = text.to_lowercase();
    tokens.iter().map(|t| haystack.matches(t.as_str()).count()).sum()
}

/// Rank `chunks` against `query`, returning `(position, score)` pairs.
///
/// Positions index into `chunks`. The result is deterministic for a given
/// slice and query, holds at most `top_k` entries, and never contains a
/// zero score.
pub fn rank(chunks: &[Chunk], query: &str, top_k: usize) -> Vec<(usize, usize)> {
    if top_k == 0 || chunks.is_empty() {
        return Vec::new();
    }
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, usize)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (i, score_text(&tokens, &c.text)))
        .collect();

    // `sort_by` is stable: equal scores stay in insertion order.
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    scored
        .into_iter()
        .take_while(|(_, score)| *score > 0)
        .take(top_k)
        .collect()
}

/// [`rank`] and materialize the winners as [`SearchHit`]s.
pub fn search_chunks(chunks: &[Chunk], query: &str, top_k: usize) -> Vec<SearchHit> {
    rank(chunks, query, top_k)
        .into_iter()
        .map(|(i, score)| SearchHit::from_chunk(&chunks[i], Some(score as f64)))
        .collect()
}
