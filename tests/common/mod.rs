#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use ragloom::config::PipelineConfig;
use ragloom::index::ChunkRecord;
use ragloom::providers::mock::MockEmbeddingProvider;
use ragloom::stores::{
    DocumentRecord, MemoryStore, SessionStore, SessionSummary, SourceTag, StoreError, Turn,
};

pub const DOC_TEXT: &str = "The capital of France is Paris.";
pub const DOC_QUESTION: &str = "What is the capital of France?";
pub const WEB_QUESTION: &str = "Who won the 2030 world cup?";

/// Embedding provider with pinned vectors so the gate's branch is forced:
/// the document question scores 0.9 against the document chunk, the web
/// question scores 0.0.
pub fn pinned_embedding() -> MockEmbeddingProvider {
    MockEmbeddingProvider::new()
        .with_dims(4)
        .pin(DOC_TEXT, vec![1.0, 0.0, 0.0, 0.0])
        .pin(DOC_QUESTION, vec![0.9, 0.435_889_9, 0.0, 0.0])
        .pin(WEB_QUESTION, vec![0.0, 0.0, 1.0, 0.0])
}

/// Config sized for the one-chunk fixture document, with a gate threshold
/// between the two pinned question scores.
pub fn tight_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_chunk_window(50, 10)
        .with_sufficiency_threshold(0.5)
}

/// Chunk records with explicit unit embeddings, for store tests.
pub fn chunk_fixture(document_id: &str, count: usize) -> Vec<ChunkRecord> {
    (0..count)
        .map(|i| {
            let mut embedding = vec![0.0f32; 4];
            embedding[i % 4] = 1.0;
            ChunkRecord::new(document_id, i, format!("chunk {i}"))
                .with_document_name("fixture.pdf")
                .with_embedding(embedding)
        })
        .collect()
}

/// Store wrapper that rejects selected operations on demand, for
/// best-effort persistence tests.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_appends: AtomicBool,
    fail_documents: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_appends: AtomicBool::new(false),
            fail_documents: AtomicBool::new(false),
        }
    }

    pub fn fail_appends(&self, on: bool) {
        self.fail_appends.store(on, Ordering::SeqCst);
    }

    pub fn fail_documents(&self, on: bool) {
        self.fail_documents.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn append_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        source: SourceTag,
    ) -> Result<Turn, StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                message: "injected append failure".into(),
            });
        }
        self.inner
            .append_turn(session_id, question, answer, source)
            .await
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        self.inner.history(session_id).await
    }

    async fn recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        self.inner.recent_turns(session_id, limit).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        self.inner.list_sessions().await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.inner.delete_session(session_id).await
    }

    async fn record_document(
        &self,
        record: DocumentRecord,
        chunks: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        if self.fail_documents.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                message: "injected document failure".into(),
            });
        }
        self.inner.record_document(record, chunks).await
    }

    async fn find_document(
        &self,
        session_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        self.inner.find_document(session_id, content_hash).await
    }

    async fn documents(&self, session_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        self.inner.documents(session_id).await
    }

    async fn load_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.load_chunks(session_id).await
    }
}
