//! Hybrid retrieval over Chabad text collections.
//!
//! This crate answers free-text questions (Hebrew, English or Yiddish) with
//! a ranked list of passages from a corpus of chunked books:
//!
//! - [`Corpus`] loads chunks from [`DocumentSource`]s such as [`JsonCollection`]
//! - [`extract_terms`] turns a query into search terms
//! - [`search_concept`] ranks chunks by term occurrence
//! - [`EmbeddingIndex`] ranks chunks by cosine similarity, cached on disk
//! - [`HybridRanker`] fuses both rankings
//! - [`Retriever`] ties everything together behind one `retrieve` call
//!
//! # Feature flags
//!
//! | Feature | Provides |
//! |---------|----------|
//! | `openai` | [`openai::OpenAIEmbeddingProvider`] |
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chabad_retrieval::*;
//!
//! let sources: Vec<Box<dyn DocumentSource>> =
//!     vec![Box::new(JsonCollection::new("maamarim", "/data/maamarim"))];
//! let corpus = Arc::new(Corpus::load(&sources)?);
//!
//! let mut index = EmbeddingIndex::new(provider, IndexConfig::new("cache/embeddings.json"))?;
//! index.load_or_build(&corpus).await?;
//!
//! let retriever = Retriever::builder().corpus(corpus).index(Arc::new(index)).build()?;
//! for result in retriever.retrieve("אהבת ישראל", 10).await? {
//!     println!("{:.2} {}", result.score, result.chunk.title);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
pub mod hybrid;
pub mod index;
pub mod keyword;
pub mod retriever;
pub mod telemetry;
pub mod terms;

#[cfg(feature = "openai")]
pub mod openai;

pub use cache::{CACHE_FORMAT_VERSION, CacheArtifact};
pub use config::{HybridConfig, IndexConfig, RetrievalConfig, RetrievalConfigBuilder};
pub use context::{MatchContext, match_context, render_for_summary};
pub use corpus::{Corpus, DocumentSource, JsonCollection, VecSource, fingerprint_chunks};
pub use document::{Chunk, ChunkKey, ChunkMetadata, SearchResult};
pub use embedding::{EmbeddingProvider, cosine_similarity};
pub use error::{Result, RetrievalError};
pub use hybrid::HybridRanker;
pub use index::EmbeddingIndex;
pub use keyword::{KeywordMatch, search, search_concept};
pub use retriever::{Retrieval, Retriever, RetrieverBuilder, is_follow_up};
pub use telemetry::init_logging;
pub use terms::extract_terms;
