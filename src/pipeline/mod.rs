//! The question-answering pipeline: stages, prompts, and the runner.
//!
//! A question is a run of the [`Stage`] machine. [`runner::PipelineRunner`]
//! drives it: retrieval against the session's vector index, the
//! deterministic sufficiency gate, the web fallback, synthesis with bounded
//! retries, and the recorded turn. [`prompt`] holds the text assembly that
//! keeps synthesis reproducible for a given corpus and history.

pub mod prompt;
pub mod runner;
pub mod stage;

pub use runner::{
    AnswerOutcome, PipelineError, PipelineRunner, PipelineRunnerBuilder, SessionInit,
};
pub use stage::Stage;
