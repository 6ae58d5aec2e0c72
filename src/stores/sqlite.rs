//! SQLite-backed session store.
//!
//! Storage model:
//! - `sessions`: one row per session (`id`, `created_at`).
//! - `turns`: append-only history, keyed by `(session_id, ordinal)`.
//!   Ordinals are computed inside the insert transaction, so they stay
//!   dense and gapless under concurrent writers; `created_at` exists for
//!   display and never participates in ordering.
//! - `documents`: ingest registry with a `(session_id, content_hash)`
//!   uniqueness constraint backing upload deduplication.
//! - `chunks`: embedded chunk rows with vectors serialized as JSON arrays,
//!   replayed in insertion order to rebuild an index on session resume.
//!
//! Embedded migrations under `./migrations` run on connect when the
//! `sqlite-migrations` feature is enabled (the default).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::instrument;

use super::{DocumentRecord, SessionStore, SessionSummary, SourceTag, StoreError, Turn};
use crate::index::ChunkRecord;

/// Query parameters for filtering turn history.
#[derive(Debug, Clone, Default)]
pub struct TurnQuery {
    /// Maximum number of results to return (capped at 1000)
    pub limit: Option<u32>,
    /// Number of results to skip (for pagination)
    pub offset: Option<u32>,
    /// Filter by minimum ordinal (inclusive)
    pub min_ordinal: Option<u64>,
    /// Filter by maximum ordinal (inclusive)
    pub max_ordinal: Option<u64>,
    /// Only return turns answered from the given source
    pub source: Option<SourceTag>,
}

/// Pagination information for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Total number of matching records
    pub total_count: u64,
    /// Number of records returned in this page
    pub page_size: u32,
    /// Zero-based offset of the first record in this page
    pub offset: u32,
    /// Whether there are more records after this page
    pub has_next_page: bool,
}

/// Paginated query result for turn history.
#[derive(Debug, Clone)]
pub struct TurnPage {
    /// The matching turns, newest first
    pub turns: Vec<Turn>,
    /// Pagination metadata
    pub page_info: PageInfo,
}

/// Durable [`SessionStore`] on a SQLite connection pool.
pub struct SqliteStore {
    /// Shared pool for concurrent session operations
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}

impl SqliteStore {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: "sqlite://ragloom.db".
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the connection or an embedded
    /// migration fails.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("connect error: {e}"),
            })?;
        // Run embedded migrations only if the feature is enabled (idempotent).
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(StoreError::Backend {
                    message: format!("migration failure: {e}"),
                });
            }
        }
        #[cfg(not(feature = "sqlite-migrations"))]
        {
            // Feature disabled: assume external migration orchestration already applied schema.
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Filtered, paginated turn history for a session, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on query failure.
    #[instrument(skip(self), err)]
    pub async fn query_turns(
        &self,
        session_id: &str,
        query: TurnQuery,
    ) -> Result<TurnPage, StoreError> {
        // Build WHERE clause conditions
        let mut conditions = vec!["session_id = ?1".to_string()];
        let mut param_count = 1;

        if query.min_ordinal.is_some() {
            param_count += 1;
            conditions.push(format!("ordinal >= ?{param_count}"));
        }
        if query.max_ordinal.is_some() {
            param_count += 1;
            conditions.push(format!("ordinal <= ?{param_count}"));
        }
        if query.source.is_some() {
            param_count += 1;
            conditions.push(format!("source = ?{param_count}"));
        }

        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) as total FROM turns WHERE {where_clause}");

        let limit = query.limit.unwrap_or(100).min(1000); // Cap at 1000
        let offset = query.offset.unwrap_or(0);

        let select_sql = format!(
            r#"SELECT session_id, ordinal, question, answer, source, created_at
               FROM turns
               WHERE {where_clause}
               ORDER BY ordinal DESC
               LIMIT {limit} OFFSET {offset}"#
        );

        let mut count_query = sqlx::query(&count_sql).bind(session_id);
        if let Some(min_ordinal) = query.min_ordinal {
            count_query = count_query.bind(min_ordinal as i64);
        }
        if let Some(max_ordinal) = query.max_ordinal {
            count_query = count_query.bind(max_ordinal as i64);
        }
        if let Some(source) = query.source {
            count_query = count_query.bind(source.as_str());
        }

        let total_count: i64 = count_query
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("count query: {e}"),
            })?
            .get("total");

        let mut select_query = sqlx::query(&select_sql).bind(session_id);
        if let Some(min_ordinal) = query.min_ordinal {
            select_query = select_query.bind(min_ordinal as i64);
        }
        if let Some(max_ordinal) = query.max_ordinal {
            select_query = select_query.bind(max_ordinal as i64);
        }
        if let Some(source) = query.source {
            select_query = select_query.bind(source.as_str());
        }

        let rows = select_query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("select query: {e}"),
            })?;

        let turns: Vec<Turn> = rows.iter().map(row_to_turn).collect();

        let page_info = PageInfo {
            total_count: total_count as u64,
            page_size: turns.len() as u32,
            offset,
            has_next_page: (offset + limit) < total_count as u32,
        };

        Ok(TurnPage { turns, page_info })
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_turn(row: &SqliteRow) -> Turn {
    let ordinal: i64 = row.get("ordinal");
    let source: String = row.get("source");
    let created_at: String = row.get("created_at");
    Turn {
        session_id: row.get("session_id"),
        ordinal: ordinal as u64,
        question: row.get("question"),
        answer: row.get("answer"),
        source: SourceTag::decode(&source),
        created_at: parse_timestamp(&created_at),
        persisted: true,
    }
}

fn row_to_document(row: &SqliteRow) -> DocumentRecord {
    let byte_len: i64 = row.get("byte_len");
    let chunk_count: i64 = row.get("chunk_count");
    let ingested_at: String = row.get("ingested_at");
    DocumentRecord {
        document_id: row.get("document_id"),
        session_id: row.get("session_id"),
        name: row.get("name"),
        content_hash: row.get("content_hash"),
        byte_len: byte_len as usize,
        chunk_count: chunk_count as usize,
        ingested_at: parse_timestamp(&ingested_at),
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    #[instrument(skip(self, question, answer), err)]
    async fn append_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        source: SourceTag,
    ) -> Result<Turn, StoreError> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::Backend {
            message: format!("tx begin: {e}"),
        })?;

        // Ensure session row
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sessions (id, created_at)
            VALUES (?1, ?2)
        "#,
        )
        .bind(session_id)
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("insert session: {e}"),
        })?;

        // Next ordinal, computed under the same transaction as the insert
        let last_ordinal: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(ordinal), 0) FROM turns WHERE session_id = ?1")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| StoreError::Backend {
                    message: format!("select max ordinal: {e}"),
                })?;
        let ordinal = last_ordinal as u64 + 1;

        sqlx::query(
            r#"
            INSERT INTO turns (session_id, ordinal, question, answer, source, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        )
        .bind(session_id)
        .bind(ordinal as i64)
        .bind(question)
        .bind(answer)
        .bind(source.as_str())
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("insert turn: {e}"),
        })?;

        tx.commit().await.map_err(|e| StoreError::Backend {
            message: format!("tx commit: {e}"),
        })?;

        Ok(Turn {
            session_id: session_id.to_string(),
            ordinal,
            question: question.to_string(),
            answer: answer.to_string(),
            source,
            created_at,
            persisted: true,
        })
    }

    #[instrument(skip(self), err)]
    async fn history(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, ordinal, question, answer, source, created_at
            FROM turns
            WHERE session_id = ?1
            ORDER BY ordinal ASC
        "#,
        )
        .bind(session_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select history: {e}"),
        })?;

        Ok(rows.iter().map(row_to_turn).collect())
    }

    #[instrument(skip(self), err)]
    async fn recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, ordinal, question, answer, source, created_at
            FROM turns
            WHERE session_id = ?1
            ORDER BY ordinal DESC
            LIMIT ?2
        "#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select recent turns: {e}"),
        })?;

        let mut turns: Vec<Turn> = rows.iter().map(row_to_turn).collect();
        turns.reverse(); // back to ascending ordinal order
        Ok(turns)
    }

    #[instrument(skip(self), err)]
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                s.id,
                s.created_at,
                COUNT(t.ordinal) AS turn_count,
                COALESCE(MAX(t.created_at), s.created_at) AS last_active,
                COALESCE(
                    (SELECT question FROM turns WHERE session_id = s.id AND ordinal = 1),
                    ''
                ) AS first_question
            FROM sessions s
            LEFT JOIN turns t ON t.session_id = s.id
            GROUP BY s.id
            ORDER BY last_active DESC
        "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select sessions: {e}"),
        })?;

        Ok(rows
            .iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                let last_active: String = row.get("last_active");
                let turn_count: i64 = row.get("turn_count");
                let first_question: String = row.get("first_question");
                SessionSummary {
                    session_id: row.get("id"),
                    created_at: parse_timestamp(&created_at),
                    last_active: parse_timestamp(&last_active),
                    turn_count: turn_count as u64,
                    preview: SessionSummary::preview_of(&first_question),
                }
            })
            .collect())
    }

    #[instrument(skip(self), err)]
    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::Backend {
            message: format!("tx begin: {e}"),
        })?;
        for table in ["chunks", "documents", "turns", "sessions"] {
            let column = if table == "sessions" { "id" } else { "session_id" };
            sqlx::query(&format!("DELETE FROM {table} WHERE {column} = ?1"))
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Backend {
                    message: format!("delete from {table}: {e}"),
                })?;
        }
        tx.commit().await.map_err(|e| StoreError::Backend {
            message: format!("tx commit: {e}"),
        })
    }

    #[instrument(skip(self, record, chunks), fields(document = %record.name), err)]
    async fn record_document(
        &self,
        record: DocumentRecord,
        chunks: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::Backend {
            message: format!("tx begin: {e}"),
        })?;

        // Ensure session row
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sessions (id, created_at)
            VALUES (?1, ?2)
        "#,
        )
        .bind(&record.session_id)
        .bind(record.ingested_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("insert session: {e}"),
        })?;

        // The (session_id, content_hash) constraint makes re-records a no-op
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO documents (
                document_id, session_id, name, content_hash,
                byte_len, chunk_count, ingested_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        )
        .bind(&record.document_id)
        .bind(&record.session_id)
        .bind(&record.name)
        .bind(&record.content_hash)
        .bind(record.byte_len as i64)
        .bind(record.chunk_count as i64)
        .bind(record.ingested_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("insert document: {e}"),
        })?;

        if inserted.rows_affected() == 0 {
            // Content already registered for this session; keep its chunks.
            return tx.commit().await.map_err(|e| StoreError::Backend {
                message: format!("tx commit: {e}"),
            });
        }

        for chunk in chunks {
            let embedding_json = serde_json::to_string(&chunk.embedding)?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks (
                    id, document_id, chunk_index, session_id, text, embedding_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&record.session_id)
            .bind(&chunk.text)
            .bind(&embedding_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("insert chunk: {e}"),
            })?;
        }

        tx.commit().await.map_err(|e| StoreError::Backend {
            message: format!("tx commit: {e}"),
        })
    }

    #[instrument(skip(self), err)]
    async fn find_document(
        &self,
        session_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT document_id, session_id, name, content_hash,
                   byte_len, chunk_count, ingested_at
            FROM documents
            WHERE session_id = ?1 AND content_hash = ?2
        "#,
        )
        .bind(session_id)
        .bind(content_hash)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select document: {e}"),
        })?;

        Ok(row.as_ref().map(row_to_document))
    }

    #[instrument(skip(self), err)]
    async fn documents(&self, session_id: &str) -> Result<Vec<DocumentRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, session_id, name, content_hash,
                   byte_len, chunk_count, ingested_at
            FROM documents
            WHERE session_id = ?1
            ORDER BY ingested_at ASC, document_id ASC
        "#,
        )
        .bind(session_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select documents: {e}"),
        })?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    #[instrument(skip(self), err)]
    async fn load_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.text, c.embedding_json,
                   COALESCE(d.name, '') AS document_name
            FROM chunks c
            LEFT JOIN documents d ON d.document_id = c.document_id
            WHERE c.session_id = ?1
            ORDER BY c.rowid ASC
        "#,
        )
        .bind(session_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select chunks: {e}"),
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let chunk_index: i64 = row.get("chunk_index");
            let embedding_json: String = row.get("embedding_json");
            let embedding: Vec<f32> = serde_json::from_str(&embedding_json)?;
            records.push(ChunkRecord {
                id: row.get("id"),
                document_id: row.get("document_id"),
                document_name: row.get("document_name"),
                chunk_index: chunk_index as usize,
                text: row.get("text"),
                embedding,
            });
        }
        Ok(records)
    }
}
