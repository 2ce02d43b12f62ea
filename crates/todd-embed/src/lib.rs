//! todd-embed: client for the local model service
//!
//! - Embedding backend abstraction with retrying and mock implementations
//! - Ollama client for embeddings and text generation
//! - Model name resolution from config and environment
//! - Exponential backoff for transient failures

pub mod backend;
pub mod error;
pub mod models;
pub mod ollama;
pub mod retry;

// Testing utilities - available in test builds
#[cfg(test)]
pub mod testing;

pub use backend::{Embedding, EmbeddingBackend, MockEmbedder, RetryingEmbedder, SharedEmbedder};
pub use error::{EmbedError, FailureClass, Result};
pub use models::{
    DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, EMBEDDING_MODEL_ENV, GENERATION_MODEL_ENV,
    ModelConfig,
};
pub use ollama::{DEFAULT_BASE_URL, Generation, OLLAMA_HOST_ENV, OllamaClient, OllamaConfig};
pub use retry::{RetryPolicy, with_retry};
