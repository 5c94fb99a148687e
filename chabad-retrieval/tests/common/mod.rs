//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chabad_retrieval::{Chunk, ChunkMetadata, EmbeddingProvider, Result, RetrievalError};

/// Deterministic provider: texts in the table get their fixed vector, every
/// other text a normalized hash-derived one.
pub struct MockEmbeddingProvider {
    model: String,
    dimensions: usize,
    table: HashMap<String, Vec<f32>>,
    failing: AtomicBool,
    batch_calls: AtomicUsize,
    query_calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            model: "mock-embedding-v1".into(),
            dimensions,
            table: HashMap::new(),
            failing: AtomicBool::new(false),
            batch_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimensions);
        self.table.insert(text.into(), vector);
        self
    }

    /// Like [`with_vector`](Self::with_vector) without the size check, to
    /// simulate a misbehaving backend.
    pub fn with_raw_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.into(), vector);
        self
    }

    /// Make every subsequent request fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.table.get(text) {
            return vector.clone();
        }
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut embedding: Vec<f32> =
            (0..self.dimensions).map(|i| (hash.wrapping_add(i as u64) as f32).sin()).collect();
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        embedding
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RetrievalError::EmbeddingProviderError {
                provider: self.model.clone(),
                message: "service unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(texts.len());
        self.check()?;
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}

pub fn chunk(source_file: &str, chunk_id: &str, text: &str) -> Chunk {
    Chunk {
        source_file: source_file.into(),
        chunk_id: chunk_id.into(),
        title: String::new(),
        text: text.into(),
        author: "הרבי".into(),
        work: "ליקוטי שיחות".into(),
        metadata: ChunkMetadata::new(),
    }
}

/// A small corpus of distinct passages, one per id.
pub fn sample_chunks() -> Vec<Chunk> {
    [
        "שבת שלום ומבורך",
        "אהבת ישראל היא יסוד כל התורה",
        "ענין התשובה הוא חזרה אל המקור",
        "the Tanya explains the two souls",
        "בטחון בה׳ ושמחה",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| chunk("sichos/vol1.json", &i.to_string(), text))
    .collect()
}
