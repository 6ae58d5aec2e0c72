//! The session-scoped question pipeline.
//!
//! [`PipelineRunner`] owns the three provider seams, a [`SessionStore`], and
//! one in-memory vector index per live session. Each question runs the
//! [`Stage`] machine to completion under a per-session lock, so a session
//! observes its own questions strictly in order while different sessions
//! proceed concurrently on a shared `Arc<PipelineRunner>`.
//!
//! Failure policy: provider errors abort the question (`Failed`, nothing is
//! recorded), while store errors after synthesis are demoted to diagnostics
//! so a computed answer is never thrown away because the ledger was down.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::event_bus::Event;
use crate::index::{IndexError, MemoryIndex, ScoredChunk, VectorIndex};
use crate::ingest::{DocumentIngestor, IngestError, IngestReport};
use crate::pipeline::prompt;
use crate::pipeline::stage::Stage;
use crate::providers::{
    CompletionProvider, EmbeddingProvider, ProviderError, SearchHit, SearchProvider, bounded,
};
use crate::stores::{
    DocumentRecord, MemoryStore, SessionStore, SessionSummary, SourceTag, StoreError, Turn,
};

/// Errors a question or ingest can surface to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("question is empty")]
    #[diagnostic(code(ragloom::pipeline::empty_question))]
    EmptyQuestion,

    #[error("unknown session {session_id:?}")]
    #[diagnostic(
        code(ragloom::pipeline::unknown_session),
        help("Call create_session before ingesting documents or asking questions.")
    )]
    UnknownSession { session_id: String },

    /// Embedding the question failed; retrieval never ran.
    #[error("question embedding failed: {0}")]
    #[diagnostic(code(ragloom::pipeline::embedding))]
    Embedding(#[source] ProviderError),

    /// The web fallback failed. There is no further tier, so the question
    /// fails without recording a turn.
    #[error("web search failed: {0}")]
    #[diagnostic(code(ragloom::pipeline::web_search))]
    WebSearch(#[source] ProviderError),

    /// Every synthesis attempt failed, retries included.
    #[error("synthesis failed after {attempts} attempts: {source}")]
    #[diagnostic(code(ragloom::pipeline::synthesis))]
    Synthesis {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// What [`PipelineRunner::create_session`] found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionInit {
    /// Nothing stored under this id; the session starts empty.
    Fresh,
    /// Stored turns or documents existed and the index was rebuilt from them.
    Resumed { turn_count: u64 },
}

/// A completed answer with its provenance.
#[derive(Clone, Debug)]
pub struct AnswerOutcome {
    pub answer: String,
    /// Which branch produced the answer.
    pub source: SourceTag,
    /// Ordinal the store assigned, when the turn was written.
    pub ordinal: Option<u64>,
    /// False when the answer was delivered but the turn write failed.
    pub persisted: bool,
    /// Chunks behind a document-sourced answer, in rank order.
    pub cited_chunks: Vec<ScoredChunk>,
    /// Search hits behind a web-sourced answer, in rank order.
    pub cited_hits: Vec<SearchHit>,
    /// The stages this question actually visited, `Start` through `Done`.
    pub stages: Vec<Stage>,
}

/// Per-session mutable state held by the runner.
struct SessionHandle {
    index: Arc<MemoryIndex>,
    /// Serializes the session's questions and ingests, and guards the
    /// dedupe ledger.
    gate: Mutex<SessionLedger>,
}

#[derive(Default)]
struct SessionLedger {
    /// Content hash of every document this session ingested, with the
    /// report the first upload produced.
    ingested: FxHashMap<String, IngestReport>,
}

/// Builder for [`PipelineRunner`]. Providers are required; the store
/// defaults to an in-memory one.
#[derive(Default)]
pub struct PipelineRunnerBuilder {
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    search: Option<Arc<dyn SearchProvider>>,
    completion: Option<Arc<dyn CompletionProvider>>,
    store: Option<Arc<dyn SessionStore>>,
    config: Option<PipelineConfig>,
    event_sender: Option<flume::Sender<Event>>,
}

impl PipelineRunnerBuilder {
    #[must_use]
    pub fn with_embedding(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(provider);
        self
    }

    #[must_use]
    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    #[must_use]
    pub fn with_completion(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion = Some(provider);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Attach an event bus sender; every pipeline event is mirrored to it.
    #[must_use]
    pub fn with_event_sender(mut self, sender: flume::Sender<Event>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Validate the configuration and assemble the runner.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingProvider`] when a required provider was never
    /// set, or any [`PipelineConfig::validate`] failure.
    pub fn build(self) -> Result<PipelineRunner, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding = self.embedding.ok_or(ConfigError::MissingProvider {
            what: "an embedding provider",
        })?;
        let search = self.search.ok_or(ConfigError::MissingProvider {
            what: "a search provider",
        })?;
        let completion = self.completion.ok_or(ConfigError::MissingProvider {
            what: "a completion provider",
        })?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn SessionStore>);

        Ok(PipelineRunner {
            embedding,
            search,
            completion,
            store,
            config,
            sessions: RwLock::new(FxHashMap::default()),
            event_sender: self.event_sender,
        })
    }
}

/// Orchestrates sessions: ingest documents, answer questions, keep history.
///
/// All methods take `&self`; wrap the runner in an [`Arc`] to share it
/// across tasks.
pub struct PipelineRunner {
    embedding: Arc<dyn EmbeddingProvider>,
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    store: Arc<dyn SessionStore>,
    config: PipelineConfig,
    sessions: RwLock<FxHashMap<String, Arc<SessionHandle>>>,
    event_sender: Option<flume::Sender<Event>>,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Everything one question accumulates on its way through the stages.
struct QuestionCtx {
    question: String,
    retrieved: Vec<ScoredChunk>,
    hits: Vec<SearchHit>,
    answer: Option<String>,
    source: SourceTag,
    ordinal: Option<u64>,
    persisted: bool,
}

impl QuestionCtx {
    fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            retrieved: Vec::new(),
            hits: Vec::new(),
            answer: None,
            source: SourceTag::None,
            ordinal: None,
            persisted: false,
        }
    }
}

impl PipelineRunner {
    #[must_use]
    pub fn builder() -> PipelineRunnerBuilder {
        PipelineRunnerBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open a session, rebuilding its vector index from the store when the
    /// id has prior turns or documents.
    ///
    /// Calling this for an id that is already live is a cheap no-op that
    /// reports the current turn count.
    #[instrument(skip(self), err)]
    pub async fn create_session(&self, session_id: &str) -> Result<SessionInit, PipelineError> {
        if self.sessions.read().unwrap().contains_key(session_id) {
            let turn_count = self.store.history(session_id).await?.len() as u64;
            return Ok(SessionInit::Resumed { turn_count });
        }

        let prior_turns = self.store.history(session_id).await?;
        let documents = self.store.documents(session_id).await?;
        let chunks = self.store.load_chunks(session_id).await?;

        let index = Arc::new(MemoryIndex::new());
        if !chunks.is_empty() {
            // One batch keeps the stored insertion order.
            index.insert_document(chunks).await?;
        }

        let mut ledger = SessionLedger::default();
        for document in &documents {
            ledger.ingested.insert(
                document.content_hash.clone(),
                IngestReport {
                    document_id: document.document_id.clone(),
                    document_name: document.name.clone(),
                    chunk_count: document.chunk_count,
                    content_hash: document.content_hash.clone(),
                    deduplicated: false,
                    persisted: true,
                },
            );
        }

        let resumed = !prior_turns.is_empty() || !documents.is_empty();
        let handle = Arc::new(SessionHandle {
            index,
            gate: Mutex::new(ledger),
        });
        self.sessions
            .write()
            .unwrap()
            .entry(session_id.to_string())
            .or_insert(handle);

        if resumed {
            debug!(
                session = session_id,
                turns = prior_turns.len(),
                documents = documents.len(),
                "session resumed"
            );
            self.emit(Event::pipeline_for_session(
                session_id,
                "session",
                format!(
                    "resumed with {} turns and {} documents",
                    prior_turns.len(),
                    documents.len()
                ),
            ));
            Ok(SessionInit::Resumed {
                turn_count: prior_turns.len() as u64,
            })
        } else {
            self.emit(Event::pipeline_for_session(
                session_id,
                "session",
                "session created",
            ));
            Ok(SessionInit::Fresh)
        }
    }

    /// Chunk, embed, and index a document for `session_id`, then persist it.
    ///
    /// Re-uploading content the session has already ingested (same hash
    /// after whitespace normalization) is skipped and reported with
    /// `deduplicated: true`. A store write failure does not fail the
    /// ingest; the document stays searchable for the life of the session
    /// and the report carries `persisted: false`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownSession`] before any work happens, or an
    /// [`IngestError`] from chunking and embedding. On error nothing is
    /// indexed.
    #[instrument(skip(self, text), err)]
    pub async fn ingest_document(
        &self,
        session_id: &str,
        document_name: &str,
        text: &str,
    ) -> Result<IngestReport, PipelineError> {
        let handle = self.session(session_id)?;
        let mut ledger = handle.gate.lock().await;

        let content_hash = DocumentIngestor::content_hash(text);
        if let Some(prior) = ledger.ingested.get(&content_hash) {
            debug!(
                session = session_id,
                document = document_name,
                "duplicate upload skipped"
            );
            self.emit(Event::pipeline_for_session(
                session_id,
                "ingest",
                format!("duplicate of {}; upload skipped", prior.document_name),
            ));
            let mut report = prior.clone();
            report.deduplicated = true;
            return Ok(report);
        }

        let ingestor = DocumentIngestor::new(self.embedding.clone(), self.config.clone());
        let (mut report, records) = ingestor.prepare(document_name, text).await?;
        handle.index.insert_document(records.clone()).await?;

        let document = DocumentRecord {
            document_id: report.document_id.clone(),
            session_id: session_id.to_string(),
            name: document_name.to_string(),
            content_hash: report.content_hash.clone(),
            byte_len: text.len(),
            chunk_count: report.chunk_count,
            ingested_at: Utc::now(),
        };
        if let Err(err) = self.store.record_document(document, &records).await {
            warn!(
                session = session_id,
                document = document_name,
                error = %err,
                "document not persisted; the in-memory index still serves it"
            );
            self.emit(Event::diagnostic(
                "store",
                format!("document {document_name} not persisted: {err}"),
            ));
            report.persisted = false;
        }

        ledger.ingested.insert(report.content_hash.clone(), report.clone());
        self.emit(Event::pipeline_for_session(
            session_id,
            "ingest",
            format!("indexed {} chunks from {document_name}", report.chunk_count),
        ));
        Ok(report)
    }

    /// Answer one question for `session_id`.
    ///
    /// Runs the stage machine: embed and retrieve, gate on the best score,
    /// synthesize from documents or fall back to web search, then record
    /// the turn. Questions within one session run strictly one at a time.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyQuestion`] for whitespace-only input,
    /// [`PipelineError::UnknownSession`] for an unopened session, and the
    /// provider errors for the stage that failed. A failed question records
    /// no turn and consumes no ordinal.
    #[instrument(skip(self, question), err)]
    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
    ) -> Result<AnswerOutcome, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }
        let handle = self.session(session_id)?;
        // Holds the gate for the whole question.
        let _serialized = handle.gate.lock().await;

        let mut ctx = QuestionCtx::new(question);
        let mut stage = Stage::Start;
        let mut stages = vec![stage];
        while !stage.is_terminal() {
            match self.step(&handle, session_id, &mut ctx, stage).await {
                Ok(next) => {
                    self.emit(Event::stage_transition(
                        session_id,
                        stage.encode(),
                        next.encode(),
                    ));
                    stages.push(next);
                    stage = next;
                }
                Err(err) => {
                    self.emit(Event::stage_transition(
                        session_id,
                        stage.encode(),
                        Stage::Failed.encode(),
                    ));
                    warn!(session = session_id, stage = %stage, error = %err, "question failed");
                    return Err(err);
                }
            }
        }

        // Citations follow the branch that answered; the losing side of
        // the gate is not provenance.
        let (cited_chunks, cited_hits) = match ctx.source {
            SourceTag::Document => (ctx.retrieved, Vec::new()),
            SourceTag::Web => (Vec::new(), ctx.hits),
            SourceTag::None => (Vec::new(), Vec::new()),
        };
        Ok(AnswerOutcome {
            answer: ctx.answer.unwrap_or_default(),
            source: ctx.source,
            ordinal: ctx.ordinal,
            persisted: ctx.persisted,
            cited_chunks,
            cited_hits,
            stages,
        })
    }

    /// Run one stage and name the next.
    async fn step(
        &self,
        handle: &SessionHandle,
        session_id: &str,
        ctx: &mut QuestionCtx,
        stage: Stage,
    ) -> Result<Stage, PipelineError> {
        match stage {
            Stage::Start => Ok(Stage::Retrieve),

            Stage::Retrieve => {
                let vector = bounded(
                    "embedding",
                    self.config.external_call_timeout,
                    self.embedding.embed(&ctx.question),
                )
                .await
                .map_err(PipelineError::Embedding)?;
                ctx.retrieved = handle
                    .index
                    .search(&vector, self.config.retrieval_top_k)
                    .await?;
                debug!(
                    session = session_id,
                    retrieved = ctx.retrieved.len(),
                    "retrieval complete"
                );
                Ok(Stage::Assess)
            }

            Stage::Assess => {
                // Deterministic gate: never a model call.
                let best = ctx.retrieved.first().map(|scored| scored.score);
                let sufficient =
                    best.is_some_and(|score| score >= self.config.sufficiency_threshold);
                let verdict = match best {
                    Some(score) => format!(
                        "best score {score:.3} vs threshold {:.3}: {}",
                        self.config.sufficiency_threshold,
                        if sufficient { "documents" } else { "web" }
                    ),
                    None => "no chunks retrieved: web".to_string(),
                };
                debug!(session = session_id, "{verdict}");
                self.emit(Event::pipeline_message_with_meta(
                    session_id,
                    Stage::Assess.encode(),
                    "gate",
                    verdict,
                ));
                if sufficient {
                    Ok(Stage::SynthesizeFromDocs)
                } else {
                    Ok(Stage::WebSearch)
                }
            }

            Stage::WebSearch => {
                let hits = bounded(
                    "web-search",
                    self.config.external_call_timeout,
                    self.search.search(&ctx.question),
                )
                .await
                .map_err(PipelineError::WebSearch)?;
                ctx.hits = hits
                    .into_iter()
                    .take(self.config.search_max_results)
                    .collect();
                debug!(session = session_id, hits = ctx.hits.len(), "web search complete");
                Ok(Stage::SynthesizeFromWeb)
            }

            Stage::SynthesizeFromDocs => {
                let context = prompt::document_context(&ctx.retrieved);
                let answer = self.synthesize(session_id, &ctx.question, &context).await?;
                ctx.answer = Some(answer);
                ctx.source = SourceTag::Document;
                Ok(Stage::Record)
            }

            Stage::SynthesizeFromWeb => {
                let context = prompt::web_context(&ctx.hits);
                let answer = self.synthesize(session_id, &ctx.question, &context).await?;
                ctx.answer = Some(answer);
                ctx.source = SourceTag::Web;
                Ok(Stage::Record)
            }

            Stage::Record => {
                let answer = ctx.answer.clone().unwrap_or_default();
                match self
                    .store
                    .append_turn(session_id, &ctx.question, &answer, ctx.source)
                    .await
                {
                    Ok(turn) => {
                        ctx.ordinal = Some(turn.ordinal);
                        ctx.persisted = true;
                    }
                    Err(err) => {
                        warn!(
                            session = session_id,
                            error = %err,
                            "turn not persisted; delivering the answer anyway"
                        );
                        self.emit(Event::diagnostic(
                            "store",
                            format!("turn for session {session_id} not persisted: {err}"),
                        ));
                        ctx.persisted = false;
                    }
                }
                Ok(Stage::Done)
            }

            Stage::Done | Stage::Failed => Ok(stage),
        }
    }

    /// Build the prompt and call the completion provider, retrying failed
    /// calls with identical input up to the configured count.
    async fn synthesize(
        &self,
        session_id: &str,
        question: &str,
        context_block: &str,
    ) -> Result<String, PipelineError> {
        let history = if prompt::references_history(question) {
            match self
                .store
                .recent_turns(session_id, self.config.history_context_turns)
                .await
            {
                Ok(turns) => turns,
                Err(err) => {
                    warn!(
                        session = session_id,
                        error = %err,
                        "history unavailable; synthesizing without it"
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let full_prompt = prompt::build_prompt(question, context_block, &history);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match bounded(
                "completion",
                self.config.external_call_timeout,
                self.completion.generate(&full_prompt),
            )
            .await
            {
                Ok(answer) => return Ok(answer),
                Err(source) if attempt <= self.config.synthesis_retry_count => {
                    warn!(
                        session = session_id,
                        attempt,
                        error = %source,
                        "synthesis failed; retrying with identical input"
                    );
                    self.emit(Event::diagnostic(
                        "synthesis",
                        format!("attempt {attempt} failed: {source}"),
                    ));
                }
                Err(source) => {
                    return Err(PipelineError::Synthesis {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Full turn history for a session, oldest first.
    ///
    /// # Errors
    ///
    /// Only store errors; an unknown session yields an empty list.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>, PipelineError> {
        Ok(self.store.history(session_id).await?)
    }

    /// Summaries for every stored session, most recently active first.
    ///
    /// # Errors
    ///
    /// Only store errors.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, PipelineError> {
        Ok(self.store.list_sessions().await?)
    }

    /// Documents a session has ingested, oldest first.
    ///
    /// # Errors
    ///
    /// Only store errors.
    pub async fn documents(&self, session_id: &str) -> Result<Vec<DocumentRecord>, PipelineError> {
        Ok(self.store.documents(session_id).await?)
    }

    /// Drop a session everywhere: stored turns, documents, chunks, and the
    /// live index. In-flight questions holding the old handle finish
    /// against their snapshot.
    ///
    /// # Errors
    ///
    /// Only store errors; unknown sessions delete cleanly.
    #[instrument(skip(self), err)]
    pub async fn delete_session(&self, session_id: &str) -> Result<(), PipelineError> {
        self.store.delete_session(session_id).await?;
        self.sessions.write().unwrap().remove(session_id);
        self.emit(Event::pipeline_for_session(
            session_id,
            "session",
            "session deleted",
        ));
        Ok(())
    }

    fn session(&self, session_id: &str) -> Result<Arc<SessionHandle>, PipelineError> {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownSession {
                session_id: session_id.to_string(),
            })
    }

    fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            // A closed bus never blocks the pipeline.
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{
        MockCompletionProvider, MockEmbeddingProvider, MockSearchProvider,
    };

    const DOC_TEXT: &str = "The capital of France is Paris.";
    const QUESTION: &str = "What is the capital of France?";

    fn pinned_embedding() -> MockEmbeddingProvider {
        MockEmbeddingProvider::new()
            .with_dims(4)
            .pin(DOC_TEXT, vec![1.0, 0.0, 0.0, 0.0])
            // Unit vector at cosine 0.9 from the document chunk.
            .pin(QUESTION, vec![0.9, 0.435_889_9, 0.0, 0.0])
            .pin("Who won the 2030 world cup?", vec![0.0, 0.0, 1.0, 0.0])
    }

    fn runner(
        embedding: MockEmbeddingProvider,
        search: MockSearchProvider,
        completion: MockCompletionProvider,
    ) -> PipelineRunner {
        PipelineRunner::builder()
            .with_embedding(Arc::new(embedding))
            .with_search(Arc::new(search))
            .with_completion(Arc::new(completion))
            .with_config(
                PipelineConfig::default()
                    .with_chunk_window(50, 10)
                    .with_sufficiency_threshold(0.5),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_every_provider() {
        let err = PipelineRunner::builder().build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingProvider {
                what: "an embedding provider"
            }
        ));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let err = PipelineRunner::builder()
            .with_config(PipelineConfig::default().with_chunk_window(10, 10))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChunkWindow { .. }));
    }

    #[tokio::test]
    async fn unknown_session_is_rejected_before_any_provider_call() {
        let embedding = MockEmbeddingProvider::new();
        let runner = runner(
            embedding,
            MockSearchProvider::empty(),
            MockCompletionProvider::echoing(),
        );
        let err = runner.ask("ghost", "hello?").await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownSession { .. }));
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let runner = runner(
            MockEmbeddingProvider::new(),
            MockSearchProvider::empty(),
            MockCompletionProvider::echoing(),
        );
        runner.create_session("s1").await.unwrap();
        let err = runner.ask("s1", "   \n ").await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyQuestion));
    }

    #[tokio::test]
    async fn document_path_answers_without_touching_web() {
        let search = MockSearchProvider::failing();
        let runner = runner(
            pinned_embedding(),
            search,
            MockCompletionProvider::new("Paris."),
        );

        assert_eq!(
            runner.create_session("s1").await.unwrap(),
            SessionInit::Fresh
        );
        let report = runner
            .ingest_document("s1", "geography.pdf", DOC_TEXT)
            .await
            .unwrap();
        assert_eq!(report.chunk_count, 1);

        let outcome = runner.ask("s1", QUESTION).await.unwrap();
        assert_eq!(outcome.answer, "Paris.");
        assert_eq!(outcome.source, SourceTag::Document);
        assert_eq!(outcome.ordinal, Some(1));
        assert!(outcome.persisted);
        assert_eq!(outcome.cited_chunks.len(), 1);
        assert!(outcome.cited_hits.is_empty());
        assert_eq!(
            outcome.stages,
            vec![
                Stage::Start,
                Stage::Retrieve,
                Stage::Assess,
                Stage::SynthesizeFromDocs,
                Stage::Record,
                Stage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn below_threshold_falls_back_to_web() {
        let search = MockSearchProvider::new(vec![SearchHit::new(
            "Nobody has won it yet.",
            "https://example.org/cup",
        )]);
        let runner = runner(
            pinned_embedding(),
            search,
            MockCompletionProvider::new("Nobody, yet."),
        );

        runner.create_session("s1").await.unwrap();
        runner
            .ingest_document("s1", "geography.pdf", DOC_TEXT)
            .await
            .unwrap();

        let outcome = runner.ask("s1", "Who won the 2030 world cup?").await.unwrap();
        assert_eq!(outcome.source, SourceTag::Web);
        assert_eq!(outcome.cited_hits.len(), 1);
        assert!(outcome.cited_chunks.is_empty());
        assert_eq!(
            outcome.stages,
            vec![
                Stage::Start,
                Stage::Retrieve,
                Stage::Assess,
                Stage::WebSearch,
                Stage::SynthesizeFromWeb,
                Stage::Record,
                Stage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_ingest_is_skipped() {
        let runner = runner(
            pinned_embedding(),
            MockSearchProvider::empty(),
            MockCompletionProvider::echoing(),
        );
        runner.create_session("s1").await.unwrap();

        let first = runner
            .ingest_document("s1", "geography.pdf", DOC_TEXT)
            .await
            .unwrap();
        // Same content after whitespace normalization, different name.
        let second = runner
            .ingest_document("s1", "copy.pdf", "The capital of France\nis Paris.")
            .await
            .unwrap();

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(second.document_id, first.document_id);
        assert_eq!(runner.documents("s1").await.unwrap().len(), 1);
    }
}
