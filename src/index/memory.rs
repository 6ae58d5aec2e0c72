//! In-process vector index behind a read-write lock.

use std::sync::RwLock;

use async_trait::async_trait;

use super::{ChunkRecord, IndexError, ScoredChunk, VectorIndex, cosine_similarity};

#[derive(Default)]
struct Inner {
    entries: Vec<ChunkRecord>,
    // Fixed by the first inserted record; every later vector must match.
    dims: Option<usize>,
}

/// Vector index holding every record in memory, scanned linearly on search.
///
/// Entries keep their insertion order, which is what breaks score ties
/// during ranking. Inserts take the write lock for the whole batch, so a
/// concurrent search never sees half a document.
#[derive(Default)]
pub struct MemoryIndex {
    inner: RwLock<Inner>,
}

impl MemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn insert_document(&self, records: Vec<ChunkRecord>) -> Result<(), IndexError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().unwrap();
        let expected = inner.dims.unwrap_or(records[0].embedding.len());
        for record in &records {
            if record.embedding.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: record.embedding.len(),
                });
            }
        }
        inner.dims = Some(expected);
        inner.entries.extend(records);
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        let inner = self.inner.read().unwrap();
        if inner.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = inner.dims {
            if query.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }

        let mut scored: Vec<ScoredChunk> = inner
            .entries
            .iter()
            .map(|record| ScoredChunk {
                record: record.clone(),
                score: cosine_similarity(query, &record.embedding),
            })
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap()
            .entries
            .len()
    }
}
