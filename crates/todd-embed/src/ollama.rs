//! Ollama API client.
//!
//! Talks to Ollama's native API: `/api/embeddings` for vectors,
//! `/api/generate` for completions and `/api/tags` for health checks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{Embedding, EmbeddingBackend};
use crate::error::{EmbedError, Result};
use crate::models::ModelConfig;
use crate::retry::{RetryPolicy, with_retry};

/// Default Ollama API base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Environment variable overriding the base URL.
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

/// Default timeout for a single HTTP request.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Retry behaviour for transient failures.
    pub retry: RetryPolicy,

    /// Models used when a call does not name one.
    pub models: ModelConfig,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            models: ModelConfig::default(),
        }
    }
}

impl OllamaConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `OLLAMA_HOST` and the model variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the environment names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            models: ModelConfig::from_lookup(&lookup),
            ..Self::default()
        };
        if let Some(host) = lookup(OLLAMA_HOST_ENV).filter(|h| !h.trim().is_empty()) {
            config = config.with_base_url(host.trim());
        }
        config
    }

    /// Set a custom base URL. A trailing `/` is dropped.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set max retries, keeping the current backoff.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    /// Set the model configuration.
    pub fn with_models(mut self, models: ModelConfig) -> Self {
        self.models = models;
        self
    }
}

/// Result of a text generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub model: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Ollama API client.
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
    embedding_model: String,
}

impl OllamaClient {
    /// Create a new client with the given configuration.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let embedding_model = config.models.embedding_model(None);
        Ok(Self {
            client,
            config,
            embedding_model,
        })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// POST a JSON body and decode the JSON reply.
    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| EmbedError::Unreachable(format!("Ollama request to {} failed: {}", path, e)))?;

        decode(response).await
    }

    /// Make a single embedding request.
    async fn embed_once(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(EmbedError::InvalidRequest(
                "Cannot embed empty text".to_string(),
            ));
        }

        tracing::debug!(
            model = %self.embedding_model,
            chars = text.len(),
            "Ollama embedding request"
        );

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };
        let response: EmbeddingResponse = self.post("/api/embeddings", &request).await?;

        if response.embedding.is_empty() {
            return Err(EmbedError::InvalidResponse(
                "Ollama returned an empty embedding".to_string(),
            ));
        }

        Ok(Embedding {
            model: self.embedding_model.clone(),
            vector: response.embedding,
            created_at: response.created_at,
        })
    }

    /// Generate a completion for `prompt`.
    ///
    /// `model` overrides the configured generation model; `options` is passed
    /// through to Ollama untouched.
    pub async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        options: Option<Value>,
    ) -> Result<Generation> {
        let model = self.config.models.generation_model(model);
        let request = GenerateRequest {
            model: &model,
            prompt,
            stream: false,
            options: options.unwrap_or_else(|| Value::Object(Default::default())),
        };

        tracing::debug!(model = %model, chars = prompt.len(), "Ollama generate request");

        let response: GenerateResponse = with_retry(self.config.retry, "ollama", || {
            self.post("/api/generate", &request)
        })
        .await?;

        Ok(Generation {
            model,
            response: response.response,
            created_at: response.created_at,
        })
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.endpoint("/api/tags"))
            .send()
            .await
            .map_err(|e| EmbedError::Unreachable(format!("Ollama model listing failed: {}", e)))?;

        let tags: TagsResponse = decode(response).await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        with_retry(self.config.retry, "ollama", || self.embed_once(text)).await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.embedding_model
    }

    async fn health_check(&self) -> Result<()> {
        self.list_models().await.map(|_| ())
    }
}

/// Turn a non-2xx reply into [`EmbedError::Status`] and decode the rest.
async fn decode<Resp: DeserializeOwned>(response: reqwest::Response) -> Result<Resp> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbedError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json().await?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
    created_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}
