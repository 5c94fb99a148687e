//! Configuration for retrieval, ranking, and the embedding index.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RetrievalError, Result};

/// Score constants for merging semantic and keyword results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HybridConfig {
    /// Added to a semantic result's score when keyword search also found it.
    pub keyword_boost: f32,
    /// Score given to a chunk found only by keyword search.
    pub keyword_baseline: f32,
    /// Quality floor applied first.
    pub primary_threshold: f32,
    /// Relaxed floor used when too few results pass the primary one.
    pub secondary_threshold: f32,
    /// Minimum number of results the primary floor must keep.
    pub min_primary_results: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            keyword_boost: 0.2,
            keyword_baseline: 0.4,
            primary_threshold: 0.5,
            secondary_threshold: 0.3,
            min_primary_results: 3,
        }
    }
}

impl HybridConfig {
    /// Check that the thresholds are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if:
    /// - `secondary_threshold > primary_threshold`
    /// - `keyword_baseline >= primary_threshold`
    /// - `keyword_boost` is negative
    pub fn validate(&self) -> Result<()> {
        if self.secondary_threshold > self.primary_threshold {
            return Err(RetrievalError::ConfigError(format!(
                "secondary_threshold ({}) must not exceed primary_threshold ({})",
                self.secondary_threshold, self.primary_threshold
            )));
        }
        if self.keyword_baseline >= self.primary_threshold {
            return Err(RetrievalError::ConfigError(format!(
                "keyword_baseline ({}) must be less than primary_threshold ({})",
                self.keyword_baseline, self.primary_threshold
            )));
        }
        if self.keyword_boost < 0.0 {
            return Err(RetrievalError::ConfigError("keyword_boost must not be negative".into()));
        }
        Ok(())
    }
}

/// Configuration parameters for the retrieval facade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Result count used when the caller does not give one.
    pub max_results: usize,
    /// Number of nearest neighbours requested from the embedding index.
    pub semantic_top_k: usize,
    /// Minimum cosine similarity for a semantic result.
    pub semantic_min_score: f32,
    /// Score fusion settings.
    pub hybrid: HybridConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            semantic_top_k: 20,
            semantic_min_score: 0.3,
            hybrid: HybridConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    pub fn max_results(mut self, max_results: usize) -> Self {
        self.config.max_results = max_results;
        self
    }

    pub fn semantic_top_k(mut self, k: usize) -> Self {
        self.config.semantic_top_k = k;
        self
    }

    pub fn semantic_min_score(mut self, score: f32) -> Self {
        self.config.semantic_min_score = score;
        self
    }

    pub fn hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.config.hybrid = hybrid;
        self
    }

    /// Build the [`RetrievalConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if:
    /// - `max_results == 0`
    /// - `semantic_top_k == 0`
    /// - `semantic_min_score` is outside `[-1, 1]`
    /// - the hybrid thresholds are inconsistent
    pub fn build(self) -> Result<RetrievalConfig> {
        if self.config.max_results == 0 {
            return Err(RetrievalError::ConfigError("max_results must be greater than zero".into()));
        }
        if self.config.semantic_top_k == 0 {
            return Err(RetrievalError::ConfigError(
                "semantic_top_k must be greater than zero".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.config.semantic_min_score) {
            return Err(RetrievalError::ConfigError(format!(
                "semantic_min_score ({}) must be within [-1, 1]",
                self.config.semantic_min_score
            )));
        }
        self.config.hybrid.validate()?;
        Ok(self.config)
    }
}

/// Configuration for building and caching the embedding index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    /// Where the embedding cache artifact is stored.
    pub cache_path: PathBuf,
    /// Maximum number of texts per provider request.
    pub batch_size: usize,
    /// Pause between provider requests, in milliseconds.
    pub batch_delay_ms: u64,
    /// Number of body characters embedded after the title.
    pub embed_text_chars: usize,
}

impl IndexConfig {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self { cache_path: cache_path.into(), batch_size: 100, batch_delay_ms: 1000, embed_text_chars: 1000 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_embed_text_chars(mut self, chars: usize) -> Self {
        self.embed_text_chars = chars;
        self
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if `batch_size == 0`.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RetrievalError::ConfigError("batch_size must be greater than zero".into()));
        }
        Ok(())
    }
}
