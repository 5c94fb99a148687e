//! Error types for the `chabad-retrieval` crate.

use thiserror::Error;

/// Errors that can occur while loading the corpus, building the index, or
/// answering a query.
///
/// An empty result list is not an error: retrieval returns `Ok(vec![])` when
/// nothing matches.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A required document source could not be read or parsed.
    #[error("Corpus unavailable ({source_name}): {message}")]
    CorpusUnavailable {
        /// The document source that failed.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// Two chunks share the same `(source_file, chunk_id)` identity.
    #[error("Duplicate chunk '{chunk_id}' in '{source_file}'")]
    DuplicateChunk {
        /// The file both chunks claim to come from.
        source_file: String,
        /// The repeated chunk identifier.
        chunk_id: String,
    },

    /// The embedding provider failed during build or query.
    #[error("Embedding provider error ({provider}): {message}")]
    EmbeddingProviderError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The provider used for a query is not the model the index was built with.
    #[error("Embedding model mismatch: index built with '{index_model}', provider is '{provider_model}'")]
    ModelMismatch {
        /// Model recorded in the index.
        index_model: String,
        /// Model reported by the provider.
        provider_model: String,
    },

    /// A persisted embedding cache failed validation.
    #[error("Embedding cache corrupt: {0}")]
    CacheCorrupt(String),

    /// The embedding cache could not be written.
    #[error("Embedding cache write failed: {0}")]
    CacheWriteError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
