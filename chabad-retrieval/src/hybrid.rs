//! Fusion of semantic and keyword results.
//!
//! Semantic similarity decides the order; keyword search contributes two
//! things: a boost for chunks both searches agree on, and a fixed baseline
//! score for exact-term hits the embedding missed. A two-tier quality floor
//! keeps weak matches out unless there would otherwise be too few results.

use std::collections::HashMap;

use tracing::debug;

use crate::config::HybridConfig;
use crate::document::{ChunkKey, SearchResult};
use crate::error::Result;

/// Merges semantic and keyword result lists into one ranking.
#[derive(Debug, Clone, Default)]
pub struct HybridRanker {
    config: HybridConfig,
}

impl HybridRanker {
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`](crate::RetrievalError::ConfigError)
    /// if the thresholds are inconsistent.
    pub fn new(config: HybridConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Merge `semantic` and `keyword` results, deduplicated by chunk identity.
    ///
    /// 1. Semantic results are taken with their scores.
    /// 2. A keyword result already present gets `keyword_boost` added; a new
    ///    one enters at `keyword_baseline`.
    /// 3. Entries are sorted by descending score (ties keep insertion order).
    /// 4. Entries below `primary_threshold` are dropped, unless fewer than
    ///    `min_primary_results` would remain, in which case
    ///    `secondary_threshold` is used instead.
    /// 5. The list is truncated to `max_results`.
    pub fn rank(
        &self,
        semantic: Vec<SearchResult>,
        keyword: Vec<SearchResult>,
        max_results: usize,
    ) -> Vec<SearchResult> {
        let semantic_count = semantic.len();
        let keyword_count = keyword.len();

        let mut merged: Vec<SearchResult> = Vec::with_capacity(semantic_count + keyword_count);
        let mut positions: HashMap<ChunkKey, usize> = HashMap::new();

        for result in semantic {
            let key = result.key();
            match positions.get(&key) {
                Some(&position) => {
                    if result.score > merged[position].score {
                        merged[position].score = result.score;
                    }
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(result);
                }
            }
        }

        let mut overlap = 0usize;
        for result in keyword {
            let key = result.key();
            match positions.get(&key) {
                Some(&position) => {
                    merged[position].score += self.config.keyword_boost;
                    overlap += 1;
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(SearchResult::new(result.chunk, self.config.keyword_baseline));
                }
            }
        }

        merged.sort_by(|a, b| b.score.total_cmp(&a.score));

        let passing_primary =
            merged.iter().filter(|r| r.score >= self.config.primary_threshold).count();
        let threshold = if passing_primary < self.config.min_primary_results {
            self.config.secondary_threshold
        } else {
            self.config.primary_threshold
        };

        let mut ranked: Vec<SearchResult> =
            merged.into_iter().filter(|r| r.score >= threshold).collect();
        ranked.truncate(max_results);

        debug!(
            semantic_count,
            keyword_count,
            overlap,
            passing_primary,
            threshold,
            result_count = ranked.len(),
            "hybrid ranking completed"
        );
        ranked
    }
}
