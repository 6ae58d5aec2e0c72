//! Tavily web-search adapter.
//!
//! Thin client for the Tavily `/search` endpoint. Result snippets come back
//! as [`SearchHit`]s in the API's ranking order; trimming them for prompt
//! use happens downstream.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ProviderError, SearchHit, SearchProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
const DEFAULT_MAX_RESULTS: usize = 5;

/// [`SearchProvider`] backed by the Tavily REST API.
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: usize,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Read `TAVILY_API_KEY` from the environment (honoring a `.env` file).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Call`] when the variable is unset.
    pub fn from_env() -> Result<Self, ProviderError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| ProviderError::Call {
            provider: "tavily",
            message: "TAVILY_API_KEY is not set".into(),
        })?;
        Ok(Self::new(api_key))
    }

    /// Point the client at a different endpoint. Tests use this to talk to
    /// a local mock server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Cap how many results one search requests and returns.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
        });

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Call {
                provider: "tavily",
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Call {
                provider: "tavily",
                message: format!("search returned HTTP {status}"),
            });
        }

        let parsed: TavilyResponse = response.json().await.map_err(|e| ProviderError::Call {
            provider: "tavily",
            message: format!("unreadable response body: {e}"),
        })?;

        Ok(parsed
            .results
            .into_iter()
            .take(self.max_results)
            .map(|result| SearchHit::new(result.content, result.url))
            .collect())
    }
}
