//! Capability traits for the pipeline's three external collaborators.
//!
//! The pipeline never talks to a vendor SDK directly; it sees exactly three
//! narrow interfaces: [`EmbeddingProvider`] turns text into vectors,
//! [`SearchProvider`] answers a query with ranked web snippets, and
//! [`CompletionProvider`] synthesizes prose from a prompt. Production
//! adapters (rig-core models, the Tavily HTTP API) live behind the `llm`
//! feature in [`rig`] and [`tavily`]; deterministic in-process versions in
//! [`mock`] are always compiled so the whole pipeline stays testable
//! without a network.
//!
//! Every call site wraps provider futures in [`bounded`], which converts an
//! elapsed deadline into [`ProviderError::Timeout`]. Providers themselves
//! stay deadline-free.

pub mod mock;
#[cfg(feature = "llm")]
pub mod rig;
#[cfg(feature = "llm")]
pub mod tavily;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by provider adapters.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    /// The call did not finish before the configured deadline.
    #[error("{provider} call timed out after {waited_ms} ms")]
    #[diagnostic(
        code(ragloom::provider::timeout),
        help("Raise external_call_timeout or check provider availability.")
    )]
    Timeout {
        provider: &'static str,
        waited_ms: u64,
    },

    /// The provider answered with an error or an unusable response.
    #[error("{provider} call failed: {message}")]
    #[diagnostic(code(ragloom::provider::call))]
    Call {
        provider: &'static str,
        message: String,
    },
}

/// One ranked result from a web search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Extracted page content, already trimmed by the search backend.
    pub snippet: String,
    /// Where the snippet came from.
    pub url: String,
}

impl SearchHit {
    pub fn new(snippet: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            snippet: snippet.into(),
            url: url.into(),
        }
    }
}

/// Turns text into fixed-width embedding vectors.
///
/// A given provider instance must be dimensionally consistent: every vector
/// it returns has the same length, and equal inputs produce equal vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed several texts, preserving input order.
    ///
    /// The default embeds sequentially; adapters with a batch endpoint
    /// should override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Answers a query with ranked web results.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one search. An empty result list is a valid answer, not an error.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError>;
}

/// Synthesizes a prose answer from a fully assembled prompt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Await `fut` under a deadline, mapping elapse to [`ProviderError::Timeout`].
///
/// `provider` names the collaborator for the error message ("embedding",
/// "web-search", "completion").
///
/// # Errors
///
/// Returns the future's own error when it finishes in time and failed, or
/// [`ProviderError::Timeout`] when the deadline elapsed first.
pub async fn bounded<T, F>(
    provider: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider,
            waited_ms: limit.as_millis() as u64,
        }),
    }
}
