//! Session persistence: turn history, document registry, and chunk replay.
//!
//! A [`SessionStore`] is the durable side of a session. It owns the
//! append-only turn ledger (where ordinals are assigned), remembers which
//! documents a session ingested (keyed by content hash, for deduplication),
//! and keeps the embedded chunks so an in-process index can be rebuilt when
//! a session is resumed. [`MemoryStore`] backs tests and ephemeral runs;
//! [`SqliteStore`] (behind the `sqlite` feature) is the durable backend.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{PageInfo, SqliteStore, TurnPage, TurnQuery};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::ChunkRecord;

/// How many question characters a session preview keeps.
const PREVIEW_MAX_CHARS: usize = 50;

/// Errors surfaced by session stores.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("store backend error: {message}")]
    #[diagnostic(code(ragloom::store::backend))]
    Backend { message: String },

    /// A persisted value could not be serialized or deserialized.
    #[error("store serialization error: {0}")]
    #[diagnostic(code(ragloom::store::serde))]
    Serde(#[from] serde_json::Error),
}

/// Where an answer came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Synthesized from the session's own documents.
    Document,
    /// Synthesized from web search results.
    Web,
    /// No source recorded (unknown or legacy rows).
    None,
}

impl SourceTag {
    /// Stable string form used in storage and telemetry.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Document => "document",
            SourceTag::Web => "web",
            SourceTag::None => "none",
        }
    }

    /// Parse the stored form; unknown strings fall back to [`SourceTag::None`]
    /// so old rows keep loading after the tag set grows.
    #[must_use]
    pub fn decode(s: &str) -> SourceTag {
        match s {
            "document" => SourceTag::Document,
            "web" => SourceTag::Web,
            _ => SourceTag::None,
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed question/answer exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: String,
    /// 1-based position in the session's history; dense and gapless.
    pub ordinal: u64,
    pub question: String,
    pub answer: String,
    pub source: SourceTag,
    pub created_at: DateTime<Utc>,
    /// False only for turns that were delivered but could not be written.
    pub persisted: bool,
}

/// Listing row for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turn_count: u64,
    /// The session's first question, shortened for display.
    pub preview: String,
}

impl SessionSummary {
    /// Shorten a question for listing: at most 50 characters, with an
    /// ellipsis when something was cut.
    #[must_use]
    pub fn preview_of(question: &str) -> String {
        let mut preview: String = question.chars().take(PREVIEW_MAX_CHARS).collect();
        if question.chars().count() > PREVIEW_MAX_CHARS {
            preview.push_str("...");
        }
        preview
    }
}

/// Registry entry for one ingested document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub session_id: String,
    pub name: String,
    /// SHA-256 of the normalized text; the dedupe key within a session.
    pub content_hash: String,
    pub byte_len: usize,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Durable state for sessions: turns, documents, and replayable chunks.
///
/// Implementations must assign turn ordinals atomically with the insert, so
/// two concurrent appends to one session can never share or skip a number.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a turn, assigning the next ordinal for the session. Creates
    /// the session row on first contact.
    async fn append_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        source: SourceTag,
    ) -> Result<Turn, StoreError>;

    /// Full history for a session in ascending ordinal order. An unknown
    /// session yields an empty list.
    async fn history(&self, session_id: &str) -> Result<Vec<Turn>, StoreError>;

    /// The most recent `limit` turns in ascending ordinal order.
    async fn recent_turns(&self, session_id: &str, limit: usize)
    -> Result<Vec<Turn>, StoreError>;

    /// Summaries for every known session, most recently active first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;

    /// Remove a session and everything attached to it. Unknown sessions
    /// delete cleanly.
    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError>;

    /// Register a document and its embedded chunks for later replay.
    /// Re-recording content the session already holds (same hash) is a
    /// no-op that keeps the first registration and its chunks.
    async fn record_document(
        &self,
        record: DocumentRecord,
        chunks: &[ChunkRecord],
    ) -> Result<(), StoreError>;

    /// Look a document up by its content hash within one session.
    async fn find_document(
        &self,
        session_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>, StoreError>;

    /// Every document the session has ingested, oldest first.
    async fn documents(&self, session_id: &str) -> Result<Vec<DocumentRecord>, StoreError>;

    /// Every chunk the session has ingested, in insertion order, for
    /// rebuilding a vector index on resume.
    async fn load_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError>;
}
