//! In-memory session store for tests, demos, and ephemeral runs.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use super::{DocumentRecord, SessionStore, SessionSummary, SourceTag, StoreError, Turn};
use crate::index::ChunkRecord;

#[derive(Default)]
struct Inner {
    created: FxHashMap<String, DateTime<Utc>>,
    turns: FxHashMap<String, Vec<Turn>>,
    documents: FxHashMap<String, Vec<DocumentRecord>>,
    chunks: FxHashMap<String, Vec<ChunkRecord>>,
}

impl Inner {
    fn touch(&mut self, session_id: &str) {
        self.created
            .entry(session_id.to_string())
            .or_insert_with(Utc::now);
    }
}

/// [`SessionStore`] that keeps everything behind one mutex.
///
/// Ordinal assignment happens under the same lock as the insert, which
/// gives the dense, gapless numbering the trait requires.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn append_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        source: SourceTag,
    ) -> Result<Turn, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.touch(session_id);
        let turns = inner.turns.entry(session_id.to_string()).or_default();
        let turn = Turn {
            session_id: session_id.to_string(),
            ordinal: turns.len() as u64 + 1,
            question: question.to_string(),
            answer: answer.to_string(),
            source,
            created_at: Utc::now(),
            persisted: true,
        };
        turns.push(turn.clone());
        Ok(turn)
    }

    async fn history(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.turns.get(session_id).cloned().unwrap_or_default())
    }

    async fn recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let turns = match inner.turns.get(session_id) {
            Some(turns) => turns,
            None => return Ok(Vec::new()),
        };
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut summaries: Vec<SessionSummary> = inner
            .created
            .iter()
            .map(|(session_id, created_at)| {
                let turns = inner.turns.get(session_id);
                let last_active = turns
                    .and_then(|t| t.last().map(|turn| turn.created_at))
                    .unwrap_or(*created_at);
                let preview = turns
                    .and_then(|t| t.first())
                    .map(|turn| SessionSummary::preview_of(&turn.question))
                    .unwrap_or_default();
                SessionSummary {
                    session_id: session_id.clone(),
                    created_at: *created_at,
                    last_active,
                    turn_count: turns.map_or(0, |t| t.len() as u64),
                    preview,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(summaries)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.created.remove(session_id);
        inner.turns.remove(session_id);
        inner.documents.remove(session_id);
        inner.chunks.remove(session_id);
        Ok(())
    }

    async fn record_document(
        &self,
        record: DocumentRecord,
        chunks: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.touch(&record.session_id);
        let duplicate = inner
            .documents
            .get(&record.session_id)
            .is_some_and(|records| {
                records
                    .iter()
                    .any(|known| known.content_hash == record.content_hash)
            });
        if duplicate {
            return Ok(());
        }
        inner
            .chunks
            .entry(record.session_id.clone())
            .or_default()
            .extend(chunks.iter().cloned());
        inner
            .documents
            .entry(record.session_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn find_document(
        &self,
        session_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.documents.get(session_id).and_then(|records| {
            records
                .iter()
                .find(|record| record.content_hash == content_hash)
                .cloned()
        }))
    }

    async fn documents(&self, session_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.documents.get(session_id).cloned().unwrap_or_default())
    }

    async fn load_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.chunks.get(session_id).cloned().unwrap_or_default())
    }
}
