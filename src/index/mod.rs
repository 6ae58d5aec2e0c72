//! Per-session vector indexes: embedded chunk storage plus similarity search.
//!
//! An index holds [`ChunkRecord`]s and answers nearest-neighbor queries in
//! cosine-similarity space. Ranking is fully deterministic: scores sort
//! descending and ties keep insertion order, so the same corpus and query
//! always produce the same chunk list. [`MemoryIndex`] is the in-process
//! implementation the pipeline uses; persistence of the records themselves
//! is the store layer's business.

pub mod memory;

pub use memory::MemoryIndex;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by vector index operations.
#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    /// A vector's width disagrees with the width the index was seeded with.
    #[error("embedding has {got} dimensions, index expects {expected}")]
    #[diagnostic(
        code(ragloom::index::dimension_mismatch),
        help("All embeddings in one index must come from the same model.")
    )]
    DimensionMismatch { expected: usize, got: usize },
}

/// One embedded chunk as stored in a vector index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable identifier for this chunk.
    pub id: String,
    /// Document the chunk was cut from.
    pub document_id: String,
    /// Human-readable document name, used for provenance tags in prompts.
    pub document_name: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// The chunk text itself.
    pub text: String,
    /// Embedding vector for `text`.
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    /// Create a record with a fresh id and no embedding yet.
    pub fn new(
        document_id: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            document_name: String::new(),
            chunk_index,
            text: text.into(),
            embedding: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_document_name(mut self, name: impl Into<String>) -> Self {
        self.document_name = name.into();
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// A retrieved chunk together with its similarity to the query.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub record: ChunkRecord,
    pub score: f32,
}

/// Chunk storage with nearest-neighbor lookup.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Add one document's chunk records as a single atomic batch. A search
    /// observes either none of the batch or all of it.
    async fn insert_document(&self, records: Vec<ChunkRecord>) -> Result<(), IndexError>;

    /// Return up to `top_k` records ranked by descending similarity to
    /// `query`. An empty index yields an empty list, never an error.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, IndexError>;

    /// How many chunk records the index holds.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Cosine similarity between two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude, so degenerate
/// embeddings rank last instead of poisoning the sort with NaN.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
