//! Pipeline tunables and environment-backed configuration.
//!
//! Every knob the retrieval pipeline exposes lives in [`PipelineConfig`].
//! Defaults are chosen for English prose and small document sets; all of
//! them can be overridden programmatically through the `with_*` builders or
//! from the environment via [`PipelineConfig::from_env`] (`RAGLOOM_*`
//! variables, with `.env` files honored through `dotenvy`).

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while assembling or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("chunk overlap {overlap} must be smaller than chunk max length {max_len}")]
    #[diagnostic(
        code(ragloom::config::invalid_chunk_window),
        help("Lower RAGLOOM_CHUNK_OVERLAP or raise RAGLOOM_CHUNK_MAX_LENGTH.")
    )]
    InvalidChunkWindow { max_len: usize, overlap: usize },

    #[error("retrieval_top_k must be at least 1")]
    #[diagnostic(code(ragloom::config::zero_top_k))]
    ZeroTopK,

    #[error("sufficiency_threshold must be a finite number, got {value}")]
    #[diagnostic(code(ragloom::config::non_finite_threshold))]
    NonFiniteThreshold { value: f32 },

    #[error("external_call_timeout must be non-zero")]
    #[diagnostic(code(ragloom::config::zero_timeout))]
    ZeroTimeout,

    #[error("invalid value for {var}: {value:?}")]
    #[diagnostic(
        code(ragloom::config::invalid_env_value),
        help("Unset the variable to fall back to the built-in default.")
    )]
    InvalidEnvValue { var: &'static str, value: String },

    #[error("pipeline builder is missing {what}")]
    #[diagnostic(
        code(ragloom::config::missing_provider),
        help("Every runner needs an embedding, search, and completion provider.")
    )]
    MissingProvider { what: &'static str },
}

/// Tunables for chunking, retrieval, external calls, and history.
///
/// The sufficiency threshold is compared against cosine similarity scores,
/// so it lives in `[-1.0, 1.0]`; retrieval is considered good enough when
/// the best-scoring chunk reaches it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum chunk width in characters.
    pub chunk_max_length: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// How many chunks retrieval hands to the sufficiency gate.
    pub retrieval_top_k: usize,
    /// Minimum best-chunk similarity for answering from documents.
    pub sufficiency_threshold: f32,
    /// Deadline applied to every embedding, search, and completion call.
    pub external_call_timeout: Duration,
    /// How many times a failed synthesis call is retried with identical input.
    pub synthesis_retry_count: u32,
    /// How many recent turns are offered as conversational context.
    pub history_context_turns: usize,
    /// Cap on web search results folded into the prompt.
    pub search_max_results: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_max_length: 1000,
            chunk_overlap: 100,
            retrieval_top_k: 4,
            sufficiency_threshold: 0.4,
            external_call_timeout: Duration::from_secs(30),
            synthesis_retry_count: 1,
            history_context_turns: 10,
            search_max_results: 5,
        }
    }
}

impl PipelineConfig {
    /// Start from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk window: maximum width and overlap, both in characters.
    #[must_use]
    pub fn with_chunk_window(mut self, max_len: usize, overlap: usize) -> Self {
        self.chunk_max_length = max_len;
        self.chunk_overlap = overlap;
        self
    }

    /// Set how many chunks retrieval returns.
    #[must_use]
    pub fn with_retrieval_top_k(mut self, top_k: usize) -> Self {
        self.retrieval_top_k = top_k;
        self
    }

    /// Set the similarity score the best chunk must reach.
    #[must_use]
    pub fn with_sufficiency_threshold(mut self, threshold: f32) -> Self {
        self.sufficiency_threshold = threshold;
        self
    }

    /// Set the deadline applied to each external provider call.
    #[must_use]
    pub fn with_external_call_timeout(mut self, timeout: Duration) -> Self {
        self.external_call_timeout = timeout;
        self
    }

    /// Set how many synthesis retries are attempted after a failure.
    #[must_use]
    pub fn with_synthesis_retry_count(mut self, retries: u32) -> Self {
        self.synthesis_retry_count = retries;
        self
    }

    /// Set how many recent turns are included as prompt context.
    #[must_use]
    pub fn with_history_context_turns(mut self, turns: usize) -> Self {
        self.history_context_turns = turns;
        self
    }

    /// Set the cap on web search results used for synthesis.
    #[must_use]
    pub fn with_search_max_results(mut self, max_results: usize) -> Self {
        self.search_max_results = max_results;
        self
    }

    /// Check the cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint: a chunk window whose overlap
    /// is not smaller than its width, a zero `retrieval_top_k`, a NaN or
    /// infinite threshold, or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_overlap >= self.chunk_max_length {
            return Err(ConfigError::InvalidChunkWindow {
                max_len: self.chunk_max_length,
                overlap: self.chunk_overlap,
            });
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if !self.sufficiency_threshold.is_finite() {
            return Err(ConfigError::NonFiniteThreshold {
                value: self.sufficiency_threshold,
            });
        }
        if self.external_call_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Build a config from `RAGLOOM_*` environment variables, falling back
    /// to the defaults for anything unset. A `.env` file in the working
    /// directory is loaded first when present.
    ///
    /// Recognized variables: `RAGLOOM_CHUNK_MAX_LENGTH`,
    /// `RAGLOOM_CHUNK_OVERLAP`, `RAGLOOM_RETRIEVAL_TOP_K`,
    /// `RAGLOOM_SUFFICIENCY_THRESHOLD`, `RAGLOOM_EXTERNAL_CALL_TIMEOUT_SECS`,
    /// `RAGLOOM_SYNTHESIS_RETRY_COUNT`, `RAGLOOM_HISTORY_CONTEXT_TURNS`,
    /// `RAGLOOM_SEARCH_MAX_RESULTS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvValue`] for a set-but-unparseable
    /// variable, or any [`validate`](Self::validate) failure on the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Some(value) = env_parse("RAGLOOM_CHUNK_MAX_LENGTH")? {
            config.chunk_max_length = value;
        }
        if let Some(value) = env_parse("RAGLOOM_CHUNK_OVERLAP")? {
            config.chunk_overlap = value;
        }
        if let Some(value) = env_parse("RAGLOOM_RETRIEVAL_TOP_K")? {
            config.retrieval_top_k = value;
        }
        if let Some(value) = env_parse("RAGLOOM_SUFFICIENCY_THRESHOLD")? {
            config.sufficiency_threshold = value;
        }
        if let Some(secs) = env_parse::<u64>("RAGLOOM_EXTERNAL_CALL_TIMEOUT_SECS")? {
            config.external_call_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = env_parse("RAGLOOM_SYNTHESIS_RETRY_COUNT")? {
            config.synthesis_retry_count = value;
        }
        if let Some(value) = env_parse("RAGLOOM_HISTORY_CONTEXT_TURNS")? {
            config.history_context_turns = value;
        }
        if let Some(value) = env_parse("RAGLOOM_SEARCH_MAX_RESULTS")? {
            config.search_max_results = value;
        }

        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvValue { var, value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().expect("defaults must validate");
        assert_eq!(config.chunk_max_length, 1000);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.retrieval_top_k, 4);
        assert!((config.sufficiency_threshold - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.external_call_timeout, Duration::from_secs(30));
        assert_eq!(config.synthesis_retry_count, 1);
        assert_eq!(config.history_context_turns, 10);
        assert_eq!(config.search_max_results, 5);
    }

    #[test]
    fn builders_chain() {
        let config = PipelineConfig::new()
            .with_chunk_window(200, 20)
            .with_retrieval_top_k(2)
            .with_sufficiency_threshold(0.75)
            .with_external_call_timeout(Duration::from_millis(250))
            .with_synthesis_retry_count(0)
            .with_history_context_turns(3)
            .with_search_max_results(1);
        config.validate().expect("chained config must validate");
        assert_eq!(config.chunk_max_length, 200);
        assert_eq!(config.retrieval_top_k, 2);
        assert_eq!(config.search_max_results, 1);
    }

    #[test]
    fn overlap_at_or_above_window_is_rejected() {
        let err = PipelineConfig::new()
            .with_chunk_window(100, 100)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChunkWindow { .. }));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let err = PipelineConfig::new()
            .with_retrieval_top_k(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTopK));
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let err = PipelineConfig::new()
            .with_sufficiency_threshold(f32::NAN)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NonFiniteThreshold { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = PipelineConfig::new()
            .with_external_call_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTimeout));
    }
}
