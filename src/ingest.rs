//! Document ingestion: normalize, hash, chunk, embed, and index.
//!
//! Ingestion is all-or-nothing with respect to the index: chunks are
//! embedded first and inserted as one batch at the end, so a failed
//! embedding call leaves the searchable corpus exactly as it was.
//! Identity is content-based: the SHA-256 of the normalized text is the
//! dedupe key the session layer uses to skip repeat uploads.

use std::sync::Arc;

use miette::Diagnostic;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::chunking::{ChunkingError, normalize_whitespace, split_into_chunks};
use crate::config::PipelineConfig;
use crate::index::{ChunkRecord, IndexError, VectorIndex};
use crate::providers::{EmbeddingProvider, ProviderError, bounded};

/// Errors raised while ingesting a document.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Chunking(#[from] ChunkingError),

    /// An embedding call failed or timed out; nothing was indexed.
    #[error("embedding failed for chunk {chunk_index}: {source}")]
    #[diagnostic(
        code(ragloom::ingest::embedding),
        help("No index entries were written; retry the upload.")
    )]
    Embedding {
        chunk_index: usize,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),
}

/// What one successful ingestion produced.
#[derive(Clone, Debug)]
pub struct IngestReport {
    pub document_id: String,
    pub document_name: String,
    pub chunk_count: usize,
    /// SHA-256 of the normalized text, hex-encoded.
    pub content_hash: String,
    /// True when the upload matched an earlier document and was skipped.
    pub deduplicated: bool,
    /// False when the durable store rejected the document; the in-memory
    /// index still serves it for the rest of the session.
    pub persisted: bool,
}

/// Turns raw document text into embedded [`ChunkRecord`]s.
pub struct DocumentIngestor {
    embedding: Arc<dyn EmbeddingProvider>,
    config: PipelineConfig,
}

impl DocumentIngestor {
    pub fn new(embedding: Arc<dyn EmbeddingProvider>, config: PipelineConfig) -> Self {
        Self { embedding, config }
    }

    /// Content hash of a document: SHA-256 over the normalized text.
    ///
    /// Whitespace-only differences between uploads hash identically.
    #[must_use]
    pub fn content_hash(text: &str) -> String {
        let normalized = normalize_whitespace(text);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Normalize, chunk, and embed a document without touching any index.
    ///
    /// Chunks are embedded one at a time under the configured deadline; the
    /// first failure aborts the whole document. Records come back in chunk
    /// order with a fresh shared `document_id`.
    ///
    /// # Errors
    ///
    /// [`IngestError::Chunking`] for empty documents or bad window settings,
    /// [`IngestError::Embedding`] when a provider call fails or times out.
    #[instrument(skip(self, text), fields(document = document_name), err)]
    pub async fn prepare(
        &self,
        document_name: &str,
        text: &str,
    ) -> Result<(IngestReport, Vec<ChunkRecord>), IngestError> {
        let normalized = normalize_whitespace(text);
        let pieces = split_into_chunks(
            &normalized,
            self.config.chunk_max_length,
            self.config.chunk_overlap,
        )?;
        let content_hash = Self::content_hash(&normalized);
        let document_id = Uuid::new_v4().to_string();

        let mut records = Vec::with_capacity(pieces.len());
        for (chunk_index, piece) in pieces.iter().enumerate() {
            let embedding = bounded(
                "embedding",
                self.config.external_call_timeout,
                self.embedding.embed(piece),
            )
            .await
            .map_err(|source| IngestError::Embedding {
                chunk_index,
                source,
            })?;
            records.push(
                ChunkRecord::new(&document_id, chunk_index, piece)
                    .with_document_name(document_name)
                    .with_embedding(embedding),
            );
        }

        let report = IngestReport {
            document_id,
            document_name: document_name.to_string(),
            chunk_count: records.len(),
            content_hash,
            deduplicated: false,
            persisted: true,
        };
        Ok((report, records))
    }

    /// [`prepare`](Self::prepare) plus an atomic insert into `index`.
    ///
    /// # Errors
    ///
    /// Everything `prepare` can return, plus [`IngestError::Index`] when
    /// the batch insert is rejected.
    pub async fn ingest(
        &self,
        index: &dyn VectorIndex,
        document_name: &str,
        text: &str,
    ) -> Result<IngestReport, IngestError> {
        let (report, records) = self.prepare(document_name, text).await?;
        index.insert_document(records).await?;
        Ok(report)
    }
}
