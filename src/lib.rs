//! # Ragloom: Session-Scoped Document QA Pipeline
//!
//! Ragloom answers questions against a per-session corpus of uploaded
//! documents, falling back to live web search when the corpus does not
//! contain a sufficient answer. The core is a small, deterministic state
//! machine per question: retrieve, gate, synthesize (from documents or
//! from the web), record.
//!
//! ## Core Concepts
//!
//! - **Session**: An isolated corpus plus an ordered turn history
//! - **Chunk**: A fixed-width, overlapping slice of a normalized document
//! - **Vector Index**: Per-session cosine-similarity retrieval over chunks
//! - **Sufficiency Gate**: A deterministic score threshold, never a model call
//! - **Providers**: Narrow traits for embedding, web search, and completion
//! - **Turn**: One recorded question/answer with ordinal and source tag
//!
//! ## Quick Start
//!
//! The whole pipeline runs against in-process mock providers, so the first
//! taste needs no keys and no network:
//!
//! ```
//! use std::sync::Arc;
//!
//! use ragloom::pipeline::PipelineRunner;
//! use ragloom::providers::mock::{
//!     MockCompletionProvider, MockEmbeddingProvider, MockSearchProvider,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> miette::Result<()> {
//! let runner = PipelineRunner::builder()
//!     .with_embedding(Arc::new(MockEmbeddingProvider::new()))
//!     .with_search(Arc::new(MockSearchProvider::empty()))
//!     .with_completion(Arc::new(MockCompletionProvider::echoing()))
//!     .build()?;
//!
//! runner.create_session("demo").await?;
//! runner
//!     .ingest_document("demo", "notes.pdf", "The capital of France is Paris.")
//!     .await?;
//!
//! let outcome = runner.ask("demo", "What is the capital of France?").await?;
//! assert!(!outcome.answer.is_empty());
//! assert_eq!(outcome.ordinal, Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! Production providers (rig-core models and the Tavily search API) live
//! behind the `llm` feature in [`providers::rig`] and [`providers::tavily`];
//! durable SQLite persistence lives behind the `sqlite` feature in
//! [`stores::sqlite`].
//!
//! ## Configuration
//!
//! Every tunable is a field on [`config::PipelineConfig`], with builders
//! and `RAGLOOM_*` environment overrides:
//!
//! ```
//! use ragloom::config::PipelineConfig;
//!
//! let config = PipelineConfig::default()
//!     .with_chunk_window(800, 80)
//!     .with_retrieval_top_k(6)
//!     .with_sufficiency_threshold(0.55);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! Errors are `thiserror` enums carrying `miette` diagnostics, so a failed
//! question reports a stable code (for example
//! `ragloom::pipeline::web_search`) plus help text. Provider failures abort
//! the question; store failures after synthesis are demoted to diagnostics
//! so a computed answer is never lost to a ledger outage.
//!
//! ## Module Guide
//!
//! - [`chunking`] - Whitespace normalization and overlapping windows
//! - [`config`] - Pipeline tunables, validation, and env loading
//! - [`ingest`] - Document hashing, chunk embedding, and index insertion
//! - [`index`] - The vector index trait and in-memory implementation
//! - [`providers`] - Embedding, search, and completion seams plus adapters
//! - [`pipeline`] - The stage machine, prompt assembly, and the runner
//! - [`stores`] - Session persistence: turns, documents, chunk replay
//! - [`event_bus`] - Structured pipeline events fanned out to sinks
//! - [`telemetry`] - Event rendering for terminals and logs

pub mod chunking;
pub mod config;
pub mod event_bus;
pub mod index;
pub mod ingest;
pub mod pipeline;
pub mod providers;
pub mod stores;
pub mod telemetry;
