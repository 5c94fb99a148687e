//! Retrieval facade.
//!
//! The [`Retriever`] is the single entry point for callers: it owns the
//! corpus, the optional embedding index, and the ranking configuration, and
//! answers [`retrieve`](Retriever::retrieve) calls. It holds no per-query
//! state, so one instance can be shared (`Arc<Retriever>`) across concurrent
//! requests.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chabad_retrieval::{Retriever, RetrievalConfig};
//!
//! let retriever = Retriever::builder()
//!     .config(RetrievalConfig::default())
//!     .corpus(Arc::new(corpus))
//!     .index(Arc::new(index))  // optional
//!     .build()?;
//!
//! let results = retriever.retrieve("מהי אהבת ישראל?", 10).await?;
//! ```

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use tracing::{error, info};

use crate::config::RetrievalConfig;
use crate::corpus::Corpus;
use crate::document::SearchResult;
use crate::error::{RetrievalError, Result};
use crate::hybrid::HybridRanker;
use crate::index::EmbeddingIndex;
use crate::keyword::search_concept;

/// Follow-up queries are short; longer queries are treated as new questions.
const MAX_FOLLOW_UP_TOKENS: usize = 6;

/// Continuation markers in English, Hebrew and Yiddish.
static CONTINUATION_MARKERS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "more", "another", "else", "continue", "again", "elaborate", "expand", "further",
        "עוד", "נוסף", "נוספת", "נוספים", "נוספות", "המשך", "תמשיך", "שוב", "הרחב",
        "נאך", "מער", "ווייטער",
    ])
});

/// Whether `query` continues an ongoing conversation rather than asking
/// something new.
///
/// Requires both a short query containing a continuation marker and
/// non-empty prior context.
pub fn is_follow_up(query: &str, prior_context: Option<&str>) -> bool {
    if prior_context.is_none_or(|context| context.trim().is_empty()) {
        return false;
    }

    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    tokens.len() <= MAX_FOLLOW_UP_TOKENS
        && tokens.iter().any(|t| CONTINUATION_MARKERS.contains(t.as_str()))
}

/// The outcome of a retrieval made inside a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    /// Ranked results, possibly empty.
    pub results: Vec<SearchResult>,
    /// Whether the query was recognized as a conversational follow-up.
    pub follow_up: bool,
}

impl Retrieval {
    /// Whether the caller should report "nothing found".
    ///
    /// An empty result for a follow-up is not reported: the caller can answer
    /// from the existing conversation.
    pub fn is_no_results(&self) -> bool {
        self.results.is_empty() && !self.follow_up
    }
}

/// The hybrid retrieval engine's entry point.
pub struct Retriever {
    config: RetrievalConfig,
    corpus: Arc<Corpus>,
    index: Option<Arc<EmbeddingIndex>>,
    ranker: HybridRanker,
}

impl Retriever {
    /// Create a new [`RetrieverBuilder`].
    pub fn builder() -> RetrieverBuilder {
        RetrieverBuilder::default()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    /// Whether queries use the embedding index.
    pub fn is_hybrid(&self) -> bool {
        self.index.as_ref().is_some_and(|index| index.is_ready())
    }

    /// Retrieve up to `max_results` chunks for `query`, best first.
    ///
    /// With a ready embedding index, keyword and semantic results are fused
    /// by the [`HybridRanker`]; otherwise keyword search is used alone. An
    /// empty list means nothing relevant was found.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingProviderError`] (or
    /// [`RetrievalError::ModelMismatch`]) if the query cannot be embedded.
    /// The failure affects only this call.
    pub async fn retrieve(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let keyword: Vec<SearchResult> = search_concept(&self.corpus, query, max_results)
            .iter()
            .map(|m| m.to_result())
            .collect();

        let results = match self.index.as_ref().filter(|index| index.is_ready()) {
            Some(index) => {
                let semantic = index
                    .query(query, self.config.semantic_top_k, self.config.semantic_min_score)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "semantic search failed");
                        e
                    })?;
                self.ranker.rank(semantic, keyword, max_results)
            }
            None => keyword,
        };

        info!(query, hybrid = self.is_hybrid(), result_count = results.len(), "retrieval completed");
        Ok(results)
    }

    /// Retrieve with the configured default result count.
    ///
    /// # Errors
    ///
    /// See [`retrieve`](Self::retrieve).
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.retrieve(query, self.config.max_results).await
    }

    /// Retrieve for a query made in a conversation with `prior_context`.
    ///
    /// The returned [`Retrieval`] records whether the query was a follow-up,
    /// so the caller can tell "nothing found" from "answer from context".
    ///
    /// # Errors
    ///
    /// See [`retrieve`](Self::retrieve).
    pub async fn retrieve_in_conversation(
        &self,
        query: &str,
        max_results: usize,
        prior_context: Option<&str>,
    ) -> Result<Retrieval> {
        let follow_up = is_follow_up(query, prior_context);
        let results = self.retrieve(query, max_results).await?;
        Ok(Retrieval { results, follow_up })
    }
}

/// Builder for constructing a [`Retriever`].
///
/// The corpus is required; the config defaults to
/// [`RetrievalConfig::default`] and the index is optional.
#[derive(Default)]
pub struct RetrieverBuilder {
    config: Option<RetrievalConfig>,
    corpus: Option<Arc<Corpus>>,
    index: Option<Arc<EmbeddingIndex>>,
}

impl RetrieverBuilder {
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn corpus(mut self, corpus: Arc<Corpus>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    /// Set the embedding index used for semantic search.
    pub fn index(mut self, index: Arc<EmbeddingIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the [`Retriever`].
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if the corpus is missing, the
    /// hybrid thresholds are inconsistent, or the index was built from a
    /// different corpus version.
    pub fn build(self) -> Result<Retriever> {
        let corpus =
            self.corpus.ok_or_else(|| RetrievalError::ConfigError("corpus is required".into()))?;
        let config = self.config.unwrap_or_default();
        let ranker = HybridRanker::new(config.hybrid.clone())?;

        if let Some(fingerprint) = self.index.as_ref().and_then(|index| index.fingerprint()) {
            if fingerprint != corpus.fingerprint() {
                return Err(RetrievalError::ConfigError(
                    "embedding index was built from a different corpus".into(),
                ));
            }
        }

        Ok(Retriever { config, corpus, index: self.index, ranker })
    }
}
