//! Adapters over rig-core models.
//!
//! These wrap any rig [`EmbeddingModel`] or agent in the crate's provider
//! traits, so the pipeline can run against OpenAI, Ollama, or any other
//! backend rig supports without knowing which one it got.

use async_trait::async_trait;
use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};
use rig::embeddings::EmbeddingModel;

use super::{CompletionProvider, EmbeddingProvider, ProviderError};

/// [`EmbeddingProvider`] backed by a rig embedding model.
///
/// ```no_run
/// use rig::client::{EmbeddingsClient, ProviderClient};
/// use rig::providers::openai;
/// use ragloom::providers::rig::RigEmbedding;
///
/// let client = openai::Client::from_env();
/// let provider = RigEmbedding::new(client.embedding_model("text-embedding-3-small"));
/// # let _ = provider;
/// ```
pub struct RigEmbedding<M> {
    model: M,
}

impl<M> RigEmbedding<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: EmbeddingModel> EmbeddingProvider for RigEmbedding<M> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Call {
                provider: "rig-embedding",
                message: "model returned no embedding".into(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self
            .model
            .embed_texts(texts.to_vec())
            .await
            .map_err(|e| ProviderError::Call {
                provider: "rig-embedding",
                message: e.to_string(),
            })?;
        if embeddings.len() != texts.len() {
            return Err(ProviderError::Call {
                provider: "rig-embedding",
                message: format!(
                    "model returned {} embeddings for {} texts",
                    embeddings.len(),
                    texts.len()
                ),
            });
        }
        Ok(embeddings
            .into_iter()
            .map(|embedding| embedding.vec.iter().map(|v| *v as f32).collect())
            .collect())
    }
}

/// [`CompletionProvider`] backed by a rig agent.
///
/// The agent carries the preamble and sampling settings; this wrapper only
/// forwards the assembled prompt and maps errors.
///
/// ```no_run
/// use rig::client::{CompletionClient, ProviderClient};
/// use rig::providers::openai;
/// use ragloom::pipeline::prompt::SYSTEM_PREAMBLE;
/// use ragloom::providers::rig::RigCompletion;
///
/// let client = openai::Client::from_env();
/// let agent = client.agent("gpt-4o-mini").preamble(SYSTEM_PREAMBLE).build();
/// let provider = RigCompletion::new(agent);
/// # let _ = provider;
/// ```
pub struct RigCompletion<M: CompletionModel> {
    agent: Agent<M>,
}

impl<M: CompletionModel> RigCompletion<M> {
    pub fn new(agent: Agent<M>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl<M: CompletionModel> CompletionProvider for RigCompletion<M> {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| ProviderError::Call {
                provider: "rig-completion",
                message: e.to_string(),
            })
    }
}
