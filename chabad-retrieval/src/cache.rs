//! On-disk embedding cache.
//!
//! The cache stores the chunk list and its vectors side by side, together
//! with the embedding model and the corpus fingerprint they were built from.
//! The file is untrusted on load: [`CacheArtifact::validate`] rejects any
//! artifact whose shape, model or fingerprint does not match, and the caller
//! rebuilds.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::corpus::fingerprint_chunks;
use crate::document::Chunk;
use crate::error::{RetrievalError, Result};

/// Version of the artifact layout; bump on incompatible changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// What a cache must have been built from to be usable.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheExpectation<'a> {
    pub model: &'a str,
    pub dimensions: usize,
    pub corpus_fingerprint: &'a str,
}

/// The persisted `{vectors, chunks}` pair plus the identity of its inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheArtifact {
    pub format_version: u32,
    pub model: String,
    pub dimensions: usize,
    pub corpus_fingerprint: String,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

impl CacheArtifact {
    pub fn new(
        model: impl Into<String>,
        dimensions: usize,
        corpus_fingerprint: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            model: model.into(),
            dimensions,
            corpus_fingerprint: corpus_fingerprint.into(),
            chunks,
            vectors,
        }
    }

    /// Read an artifact from `path`.
    ///
    /// Returns `Ok(None)` when no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::CacheCorrupt`] if the file exists but cannot
    /// be read or parsed.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RetrievalError::CacheCorrupt(format!(
                    "failed to open '{}': {e}",
                    path.display()
                )));
            }
        };

        let artifact: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            RetrievalError::CacheCorrupt(format!("failed to parse '{}': {e}", path.display()))
        })?;
        debug!(path = %path.display(), chunk_count = artifact.chunks.len(), "read embedding cache");
        Ok(Some(artifact))
    }

    /// Write the artifact to `path`, replacing any existing file.
    ///
    /// The data goes to a sibling temporary file first and is renamed into
    /// place, so readers never observe a half-written cache.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::CacheWriteError`] if any filesystem step fails.
    pub fn write(&self, path: &Path) -> Result<()> {
        let write_error = |step: &str, e: &dyn std::fmt::Display| {
            error!(path = %path.display(), step, error = %e, "failed to write embedding cache");
            RetrievalError::CacheWriteError(format!("{step} '{}': {e}", path.display()))
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_error("create directory for", &e))?;
        }

        let tmp_path = temporary_path(path);
        let file = File::create(&tmp_path).map_err(|e| write_error("create", &e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|e| write_error("serialize", &e))?;
        writer.flush().map_err(|e| write_error("flush", &e))?;
        drop(writer);

        fs::rename(&tmp_path, path).map_err(|e| write_error("rename into", &e))?;
        debug!(path = %path.display(), chunk_count = self.chunks.len(), "wrote embedding cache");
        Ok(())
    }

    /// Check the artifact against what the index expects.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::CacheCorrupt`] describing the first mismatch.
    pub fn validate(&self, expected: &CacheExpectation<'_>) -> Result<()> {
        let corrupt = |message: String| Err(RetrievalError::CacheCorrupt(message));

        if self.format_version != CACHE_FORMAT_VERSION {
            return corrupt(format!(
                "format version {} (expected {CACHE_FORMAT_VERSION})",
                self.format_version
            ));
        }
        if self.model != expected.model {
            return corrupt(format!("built with model '{}', provider is '{}'", self.model, expected.model));
        }
        if self.dimensions == 0 || self.dimensions != expected.dimensions {
            return corrupt(format!(
                "dimensions {} (expected {})",
                self.dimensions, expected.dimensions
            ));
        }
        if self.vectors.len() != self.chunks.len() {
            return corrupt(format!(
                "{} vectors for {} chunks",
                self.vectors.len(),
                self.chunks.len()
            ));
        }
        if let Some(position) = self
            .vectors
            .iter()
            .position(|v| v.len() != self.dimensions || v.iter().any(|x| !x.is_finite()))
        {
            return corrupt(format!("vector {position} is malformed"));
        }
        if fingerprint_chunks(&self.chunks) != self.corpus_fingerprint {
            return corrupt("chunk list does not match its recorded fingerprint".into());
        }
        if self.corpus_fingerprint != expected.corpus_fingerprint {
            return corrupt("built from a different corpus version".into());
        }
        Ok(())
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
