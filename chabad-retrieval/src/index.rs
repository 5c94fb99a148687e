//! Dense-vector index over the corpus.
//!
//! An [`EmbeddingIndex`] holds one vector per chunk, co-indexed with a copy
//! of the chunk list. It is populated once at startup, either from the
//! on-disk cache ([`load_cache`](EmbeddingIndex::load_cache)) or by sending
//! every chunk through the embedding provider
//! ([`build`](EmbeddingIndex::build)), and is read-only afterwards: wrap it
//! in an `Arc` and query it from as many tasks as needed.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chabad_retrieval::{EmbeddingIndex, IndexConfig};
//!
//! let mut index = EmbeddingIndex::new(provider, IndexConfig::new("cache/embeddings.json"))?;
//! index.load_or_build(&corpus).await?;
//! let index = Arc::new(index);
//!
//! let results = index.query("אהבת ישראל", 10, 0.3).await?;
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::{CacheArtifact, CacheExpectation};
use crate::config::IndexConfig;
use crate::corpus::Corpus;
use crate::document::{Chunk, SearchResult};
use crate::embedding::{EmbeddingProvider, cosine_similarity};
use crate::error::{RetrievalError, Result};

/// Vectors and chunks, always replaced together.
#[derive(Debug, Clone, Default)]
struct IndexState {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    model: String,
    dimensions: usize,
    fingerprint: String,
}

/// Cosine-similarity index over chunk embeddings.
pub struct EmbeddingIndex {
    provider: Arc<dyn EmbeddingProvider>,
    config: IndexConfig,
    state: Option<IndexState>,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("model", &self.provider.model())
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

/// The text sent to the provider for a chunk: its title, a newline, and the
/// first `body_chars` characters of its body.
pub fn embedding_input(chunk: &Chunk, body_chars: usize) -> String {
    let body: String = chunk.text.chars().take(body_chars).collect();
    if chunk.title.is_empty() { body } else { format!("{}\n{body}", chunk.title) }
}

impl EmbeddingIndex {
    /// Create an empty index that will embed with `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ConfigError`] if the configuration is invalid.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { provider, config, state: None })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Whether vectors are loaded and queries can be served.
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.chunks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Model the loaded vectors were produced with.
    pub fn model(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.model.as_str())
    }

    /// Fingerprint of the corpus the loaded vectors belong to.
    pub fn fingerprint(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.fingerprint.as_str())
    }

    /// Indexed chunks, in vector order.
    pub fn chunks(&self) -> &[Chunk] {
        self.state.as_ref().map(|s| s.chunks.as_slice()).unwrap_or(&[])
    }

    /// Indexed vectors, in chunk order.
    pub fn vectors(&self) -> &[Vec<f32>] {
        self.state.as_ref().map(|s| s.vectors.as_slice()).unwrap_or(&[])
    }

    /// Embed every chunk of `corpus` and persist the result to the cache.
    ///
    /// Chunks are sent in batches of `batch_size` with `batch_delay` between
    /// requests. Nothing is committed until every batch has succeeded, so a
    /// failed or cancelled (dropped) build leaves the index as it was.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingProviderError`] if a request fails or
    /// returns vectors of the wrong count or size, and
    /// [`RetrievalError::CacheWriteError`] if the cache cannot be written.
    pub async fn build(&mut self, corpus: &Corpus) -> Result<()> {
        let chunks = corpus.chunks();
        let model = self.provider.model().to_string();
        let dimensions = self.provider.dimensions();
        let inputs: Vec<String> =
            chunks.iter().map(|c| embedding_input(c, self.config.embed_text_chars)).collect();
        let batch_count = inputs.len().div_ceil(self.config.batch_size);

        info!(chunk_count = chunks.len(), batch_count, model = %model, "building embedding index");

        let mut vectors = Vec::with_capacity(inputs.len());
        for (batch_index, batch) in inputs.chunks(self.config.batch_size).enumerate() {
            if batch_index > 0 && !self.config.batch_delay().is_zero() {
                tokio::time::sleep(self.config.batch_delay()).await;
            }

            let texts: Vec<&str> = batch.iter().map(String::as_str).collect();
            let embedded = self.provider.embed_batch(&texts).await.map_err(|e| {
                error!(batch_index, error = %e, "embedding batch failed");
                e
            })?;
            self.check_batch(&embedded, texts.len(), dimensions)?;
            vectors.extend(embedded);
            debug!(batch_index, embedded = vectors.len(), "embedded batch");
        }

        let artifact = CacheArtifact::new(
            model.clone(),
            dimensions,
            corpus.fingerprint(),
            chunks.to_vec(),
            vectors,
        );
        artifact.write(&self.config.cache_path)?;

        self.state = Some(IndexState {
            chunks: artifact.chunks,
            vectors: artifact.vectors,
            model,
            dimensions,
            fingerprint: artifact.corpus_fingerprint,
        });
        info!(chunk_count = self.len(), "embedding index built");
        Ok(())
    }

    fn provider_error(&self, message: String) -> RetrievalError {
        RetrievalError::EmbeddingProviderError { provider: self.provider.model().to_string(), message }
    }

    fn check_batch(&self, embedded: &[Vec<f32>], expected: usize, dimensions: usize) -> Result<()> {
        let provider_error = |message: String| self.provider_error(message);
        if embedded.len() != expected {
            return Err(provider_error(format!(
                "returned {} vectors for {expected} inputs",
                embedded.len()
            )));
        }
        if let Some(bad) = embedded.iter().find(|v| v.len() != dimensions) {
            return Err(provider_error(format!(
                "returned a {}-dimensional vector, expected {dimensions}",
                bad.len()
            )));
        }
        if let Some(position) = embedded.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(provider_error(format!("returned a non-finite value in vector {position}")));
        }
        Ok(())
    }

    /// A query vector must match the index dimensions and be finite.
    fn check_query_vector(&self, vector: &[f32], dimensions: usize) -> Result<()> {
        if vector.len() != dimensions {
            return Err(self.provider_error(format!(
                "returned a {}-dimensional query vector, index has {dimensions}",
                vector.len()
            )));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(self.provider_error("returned a non-finite query vector".into()));
        }
        Ok(())
    }

    /// Load vectors from the cache if it matches `corpus` and the provider.
    ///
    /// Returns `true` when the index is ready. A missing, unreadable or
    /// mismatched cache is logged and reported as `false`; it is never used.
    pub fn load_cache(&mut self, corpus: &Corpus) -> bool {
        let path = &self.config.cache_path;
        let artifact = match CacheArtifact::read(path) {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                info!(path = %path.display(), "no embedding cache found");
                return false;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable embedding cache");
                return false;
            }
        };

        let expected = CacheExpectation {
            model: self.provider.model(),
            dimensions: self.provider.dimensions(),
            corpus_fingerprint: corpus.fingerprint(),
        };
        if let Err(e) = artifact.validate(&expected) {
            warn!(path = %path.display(), error = %e, "ignoring stale or corrupt embedding cache");
            return false;
        }

        info!(path = %path.display(), chunk_count = artifact.chunks.len(), "loaded embedding cache");
        self.state = Some(IndexState {
            chunks: artifact.chunks,
            vectors: artifact.vectors,
            model: artifact.model,
            dimensions: artifact.dimensions,
            fingerprint: artifact.corpus_fingerprint,
        });
        true
    }

    /// Load the cache, or build and persist the index when the cache is
    /// unusable.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`build`](Self::build).
    pub async fn load_or_build(&mut self, corpus: &Corpus) -> Result<()> {
        if self.load_cache(corpus) {
            return Ok(());
        }
        self.build(corpus).await
    }

    /// Nearest chunks to `text` by cosine similarity.
    ///
    /// Returns at most `top_k` results, all scoring at least `min_score`,
    /// ordered by descending score. An index that is not ready returns no
    /// results.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingProviderError`] if embedding the
    /// query fails or yields a vector of the wrong size or with non-finite
    /// values, and [`RetrievalError::ModelMismatch`] if the provider's
    /// model is not the one the index was built with.
    pub async fn query(&self, text: &str, top_k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
        let Some(state) = &self.state else {
            return Ok(Vec::new());
        };
        if state.model != self.provider.model() {
            return Err(RetrievalError::ModelMismatch {
                index_model: state.model.clone(),
                provider_model: self.provider.model().to_string(),
            });
        }

        let query_vector = self.provider.embed(text).await.map_err(|e| {
            error!(error = %e, "query embedding failed");
            e
        })?;
        self.check_query_vector(&query_vector, state.dimensions).map_err(|e| {
            error!(error = %e, "rejected query embedding");
            e
        })?;
        Ok(self.query_vector(&query_vector, top_k, min_score))
    }

    /// Nearest chunks to an already-embedded query vector.
    ///
    /// Scores are sorted descending and walked in order; the walk stops at the
    /// first score below `min_score` or once `top_k` results are collected.
    pub fn query_vector(&self, query: &[f32], top_k: usize, min_score: f32) -> Vec<SearchResult> {
        let Some(state) = &self.state else {
            return Vec::new();
        };

        let mut scored: Vec<(usize, f32)> = state
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let results: Vec<SearchResult> = scored
            .into_iter()
            .take_while(|(_, score)| *score >= min_score)
            .take(top_k)
            .map(|(position, score)| SearchResult::new(state.chunks[position].clone(), score))
            .collect();

        debug!(top_k, min_score, result_count = results.len(), "semantic search completed");
        results
    }
}
