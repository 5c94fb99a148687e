//! Keyword search over the corpus.
//!
//! [`search`] finds every chunk containing a single term. [`search_concept`]
//! drives it with the terms extracted from a query, collecting hits from the
//! most specific term first and ranking the collected chunks by how many
//! terms they contain, whether the literal query appears, and chunk length.

use std::cmp::Reverse;
use std::collections::HashSet;

use tracing::debug;

use crate::corpus::Corpus;
use crate::document::{Chunk, ChunkKey, SearchResult};
use crate::terms::extract_terms;

/// Plural suffixes stripped to form a root match.
const PLURAL_SUFFIXES: [&str; 2] = ["ים", "ות"];

/// Roots shorter than this are too ambiguous to match on.
const MIN_ROOT_CHARS: usize = 3;

/// Chunk lengths (in characters) inside this window get [`SWEET_SPOT_BONUS`].
const SWEET_SPOT: std::ops::RangeInclusive<usize> = 500..=2000;

/// Length outside the sweet spot is penalized by its distance from this.
const IDEAL_LENGTH: i64 = 1000;

/// Sort key for sweet-spot chunks; any chunk outside the window is at least
/// 500 characters from the ideal length, so it always sorts after.
const SWEET_SPOT_BONUS: i64 = -1000;

/// The root form of `term`, if it ends in a plural suffix and the remainder
/// is long enough.
pub fn root_form(term: &str) -> Option<&str> {
    PLURAL_SUFFIXES.iter().find_map(|suffix| {
        term.strip_suffix(suffix).filter(|root| root.chars().count() >= MIN_ROOT_CHARS)
    })
}

/// Whether a chunk text contains `term`.
///
/// `folded_text` is the lowercased chunk text. A term matches as a
/// case-insensitive substring, as an exact substring, or through its
/// [`root_form`]. An empty term matches nothing.
pub fn matches_term(text: &str, folded_text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if folded_text.contains(&term.to_lowercase()) || text.contains(term) {
        return true;
    }
    root_form(term).is_some_and(|root| text.contains(root))
}

/// Every chunk containing `term`, in corpus order.
pub fn search<'a>(term: &str, corpus: &'a Corpus) -> Vec<&'a Chunk> {
    corpus
        .iter_folded()
        .filter(|(chunk, folded)| matches_term(&chunk.text, folded, term))
        .map(|(chunk, _)| chunk)
        .collect()
}

/// Sort component rewarding chunks of a readable length. Lower is better.
pub fn length_score(chars: usize) -> i64 {
    if SWEET_SPOT.contains(&chars) {
        SWEET_SPOT_BONUS
    } else {
        (chars as i64 - IDEAL_LENGTH).abs()
    }
}

/// A chunk found by keyword search, with the signals used to rank it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch<'a> {
    pub chunk: &'a Chunk,
    /// Number of distinct extracted terms the chunk contains.
    pub term_count: usize,
    /// Whether the query appears verbatim in the chunk.
    pub exact_match: bool,
    /// Number of terms extracted from the query.
    pub total_terms: usize,
}

impl KeywordMatch<'_> {
    /// Ascending sort key: more terms, then exact match, then better length.
    fn sort_key(&self) -> (Reverse<usize>, Reverse<bool>, i64) {
        (
            Reverse(self.term_count),
            Reverse(self.exact_match),
            length_score(self.chunk.text.chars().count()),
        )
    }

    /// Share of extracted terms found in the chunk, in `[0, 1]`.
    pub fn score(&self) -> f32 {
        if self.total_terms == 0 {
            return 0.0;
        }
        (self.term_count as f32 / self.total_terms as f32).min(1.0)
    }

    /// Convert into an owned [`SearchResult`] scored by [`score`](Self::score).
    pub fn to_result(&self) -> SearchResult {
        SearchResult::new(self.chunk.clone(), self.score())
    }
}

/// Search for a whole query: extract terms, collect hits term by term, rank.
///
/// Terms are tried from most to least specific and scanning stops as soon as
/// `max_results` distinct chunks are collected, so single-word hits are only
/// used when the phrases did not fill the quota. At most `max_results`
/// matches are returned.
pub fn search_concept<'a>(
    corpus: &'a Corpus,
    query: &str,
    max_results: usize,
) -> Vec<KeywordMatch<'a>> {
    if max_results == 0 {
        return Vec::new();
    }

    let terms = extract_terms(query);
    let mut seen: HashSet<ChunkKey> = HashSet::new();
    let mut collected: Vec<(usize, &Chunk)> = Vec::new();

    for term in &terms {
        if collected.len() >= max_results {
            break;
        }
        for (position, (chunk, folded)) in corpus.iter_folded().enumerate() {
            if matches_term(&chunk.text, folded, term) && seen.insert(chunk.key()) {
                collected.push((position, chunk));
            }
        }
        debug!(term = %term, collected = collected.len(), "keyword term scanned");
    }

    let mut matches: Vec<KeywordMatch<'a>> = collected
        .into_iter()
        .map(|(position, chunk)| {
            let folded = corpus.folded_text(position).unwrap_or_default();
            let term_count =
                terms.iter().filter(|term| matches_term(&chunk.text, folded, term)).count();
            KeywordMatch {
                chunk,
                term_count,
                exact_match: !query.is_empty() && chunk.text.contains(query),
                total_terms: terms.len(),
            }
        })
        .collect();

    matches.sort_by_key(|m| m.sort_key());
    matches.truncate(max_results);

    debug!(query, term_count = terms.len(), result_count = matches.len(), "keyword search completed");
    matches
}
