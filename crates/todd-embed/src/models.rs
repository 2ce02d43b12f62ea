//! Model name resolution.

use serde::Serialize;

/// Built-in generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "gemma2:9b-instruct";

/// Built-in embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemma2:2b-instruct";

/// Environment variable overriding the generation model.
pub const GENERATION_MODEL_ENV: &str = "TODD_GENERATION_MODEL";

/// Environment variable overriding the embedding model.
pub const EMBEDDING_MODEL_ENV: &str = "TODD_EMBEDDING_MODEL";

/// Which models to use when a caller does not name one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub generation_model: String,
    pub embedding_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

impl ModelConfig {
    /// Built-in defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Built-in defaults overridden by whatever `lookup` returns.
    ///
    /// Empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let resolve = |name: &str, default: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            generation_model: resolve(GENERATION_MODEL_ENV, DEFAULT_GENERATION_MODEL),
            embedding_model: resolve(EMBEDDING_MODEL_ENV, DEFAULT_EMBEDDING_MODEL),
        }
    }

    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// The generation model to use, preferring a non-empty `override_model`.
    pub fn generation_model(&self, override_model: Option<&str>) -> String {
        pick(override_model, &self.generation_model)
    }

    /// The embedding model to use, preferring a non-empty `override_model`.
    pub fn embedding_model(&self, override_model: Option<&str>) -> String {
        pick(override_model, &self.embedding_model)
    }
}

fn pick(override_model: Option<&str>, configured: &str) -> String {
    override_model
        .filter(|m| !m.is_empty())
        .unwrap_or(configured)
        .to_string()
}
