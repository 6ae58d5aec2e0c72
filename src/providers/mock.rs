//! Deterministic in-process providers for tests, demos, and offline runs.
//!
//! The embedding mock derives a stable unit vector from the input text, so
//! similarity scores are reproducible across runs without any model. Exact
//! scores can be forced by pinning texts to hand-picked vectors, which is
//! how the gate tests steer retrieval above or below the threshold. The
//! search and completion mocks return canned data and can inject failures,
//! delays, and call counting.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use super::{CompletionProvider, EmbeddingProvider, ProviderError, SearchHit, SearchProvider};

/// Embedding provider with hash-derived, deterministic vectors.
pub struct MockEmbeddingProvider {
    dims: usize,
    pinned: FxHashMap<String, Vec<f32>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            dims: 16,
            pinned: FxHashMap::default(),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the width of generated vectors. Pinned vectors are used verbatim
    /// and may have a different width.
    #[must_use]
    pub fn with_dims(mut self, dims: usize) -> Self {
        self.dims = dims;
        self
    }

    /// Force an exact vector for one input text.
    #[must_use]
    pub fn pin(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), vector);
        self
    }

    /// A provider whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        let provider = Self::new();
        provider.fail.store(true, Ordering::Relaxed);
        provider
    }

    /// How many `embed` calls this instance has served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn derive_vector(&self, text: &str) -> Vec<f32> {
        // FNV-1a over the bytes, then splitmix64 per component.
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01B3);
        }

        let mut vector: Vec<f32> = (0..self.dims as u64)
            .map(|i| {
                let mut z = seed.wrapping_add((i + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
                z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
                z ^= z >> 31;
                ((z as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32
            })
            .collect();

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            return Err(ProviderError::Call {
                provider: "mock-embedding",
                message: "injected embedding failure".into(),
            });
        }
        if let Some(vector) = self.pinned.get(text) {
            return Ok(vector.clone());
        }
        Ok(self.derive_vector(text))
    }
}

/// Search provider returning a canned hit list.
pub struct MockSearchProvider {
    hits: Vec<SearchHit>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockSearchProvider {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that finds nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// A provider whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        let mut provider = Self::empty();
        provider.fail = true;
        provider
    }

    /// Sleep before answering, to exercise deadline handling.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many `search` calls this instance has served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ProviderError::Call {
                provider: "mock-search",
                message: "injected search failure".into(),
            });
        }
        Ok(self.hits.clone())
    }
}

/// Completion provider returning a canned answer or echoing its prompt.
pub struct MockCompletionProvider {
    answer: String,
    echo: bool,
    fail_remaining: AtomicU32,
    calls: AtomicUsize,
}

impl MockCompletionProvider {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            echo: false,
            fail_remaining: AtomicU32::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that returns the prompt it was given, for asserting on
    /// prompt assembly from the outside.
    #[must_use]
    pub fn echoing() -> Self {
        let mut provider = Self::new("");
        provider.echo = true;
        provider
    }

    /// Fail the next `n` calls, then succeed.
    #[must_use]
    pub fn fail_times(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::Relaxed);
        self
    }

    /// A provider whose every call fails.
    #[must_use]
    pub fn always_failing() -> Self {
        Self::new("").fail_times(u32::MAX)
    }

    /// How many `generate` calls this instance has served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let should_fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ProviderError::Call {
                provider: "mock-completion",
                message: "injected completion failure".into(),
            });
        }
        if self.echo {
            return Ok(prompt.to_string());
        }
        Ok(self.answer.clone())
    }
}
