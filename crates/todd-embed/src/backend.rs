//! Embedding backend trait and implementations.
//!
//! This module defines the abstraction over embedding providers and provides
//! a retrying wrapper plus a scripted mock for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::retry::{RetryPolicy, with_retry};

/// A computed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Embedding {
    /// Model that produced the vector.
    pub model: String,
    /// The vector itself.
    pub vector: Vec<f32>,
    /// Creation time reported by the service, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Embedding {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
            created_at: None,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// Trait for text embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Model used for embeddings.
    fn model(&self) -> &str;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<()>;
}

/// An embedding backend that can be shared across tasks.
pub type SharedEmbedder = Arc<dyn EmbeddingBackend>;

/// Wraps a backend with exponential backoff on transient failures.
pub struct RetryingEmbedder<B: EmbeddingBackend> {
    inner: B,
    policy: RetryPolicy,
    name: String,
}

impl<B: EmbeddingBackend> RetryingEmbedder<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        let name = format!("retrying({})", inner.name());
        Self {
            inner,
            policy,
            name,
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: EmbeddingBackend> EmbeddingBackend for RetryingEmbedder<B> {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        with_retry(self.policy, self.inner.name(), || self.inner.embed(text)).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

/// A mock embedder for testing purposes.
///
/// Returns scripted results in order, then falls back to a fixed vector if
/// one was configured. Every requested text is recorded.
#[derive(Debug)]
pub struct MockEmbedder {
    name: String,
    model: String,
    script: Mutex<VecDeque<Result<Vec<f32>>>>,
    fallback: Option<Vec<f32>>,
    requests: Mutex<Vec<String>>,
}

impl MockEmbedder {
    /// A mock that always returns `vector`.
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-embed".to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Some(vector),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A mock that plays back `results` and errors once they run out.
    pub fn with_script(results: Vec<Result<Vec<f32>>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            fallback: None,
            ..Self::new(Vec::new())
        }
    }

    /// A mock whose every call fails with `error`.
    pub fn failing(error: EmbedError) -> Self {
        Self::with_script(vec![Err(error)]).repeat_last()
    }

    /// Keep returning the last scripted result once the script is exhausted.
    fn repeat_last(mut self) -> Self {
        let last = self.script.get_mut().ok().and_then(|s| s.back().cloned());
        if let Some(Err(error)) = last {
            self.script = Mutex::new(std::iter::repeat_n(Err(error), 64).collect());
        }
        self
    }

    /// Texts passed to `embed`, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.requests.lock().unwrap().push(text.to_string());

        let scripted = self.script.lock().unwrap().pop_front();
        let vector = match scripted {
            Some(result) => result?,
            None => self.fallback.clone().ok_or_else(|| {
                EmbedError::InvalidResponse("MockEmbedder: no more responses available".to_string())
            })?,
        };

        Ok(Embedding::new(&self.model, vector))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
