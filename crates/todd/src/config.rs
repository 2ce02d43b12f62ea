//! Configuration file support for todd.
//!
//! All todd data is stored in a `.todd/` directory:
//! - `.todd/config.toml` - Configuration file
//! - `.todd/todd.db` - SQLite database
//!
//! Config discovery searches for `.todd/config.toml` starting from the current
//! directory and walking up to parent directories.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use todd_embed::{OllamaConfig, RetryPolicy};

/// The todd data directory name.
pub const TODD_DIR: &str = ".todd";
/// The config file name within the todd directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Ollama connection settings.
    pub ollama: OllamaSection,
    /// Model overrides.
    pub models: ModelsSection,
    /// Vector side effect settings.
    pub indexer: IndexerConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            // Relative to .todd/ directory
            path: PathBuf::from("todd.db"),
        }
    }
}

/// Ollama connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OllamaSection {
    /// API base URL override (otherwise `OLLAMA_HOST` or the default).
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for OllamaSection {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            base_url: None,
            timeout_secs: 120,
            max_retries: retry.max_retries,
            retry_backoff_ms: retry.initial_backoff.as_millis() as u64,
        }
    }
}

/// Model overrides. Unset entries fall back to the environment, then defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsSection {
    pub generation: Option<String>,
    pub embedding: Option<String>,
}

/// Indexer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Compute vectors for mutations.
    pub enabled: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Looks for `.todd/config.toml` in the directory and its parents and
    /// returns the `.todd` directory alongside the config.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let todd_dir = dir.join(TODD_DIR);
            let config_path = todd_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, todd_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve the database path relative to the .todd directory.
    pub fn resolve_database_path(&self, todd_dir: Option<&Path>) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else if let Some(dir) = todd_dir {
            dir.join(&self.database.path)
        } else {
            // Fall back to .todd in current directory
            PathBuf::from(TODD_DIR).join(&self.database.path)
        }
    }

    /// Ollama client settings from this config and the process environment.
    pub fn ollama_config(&self) -> OllamaConfig {
        self.ollama_config_with(|name| std::env::var(name).ok())
    }

    /// Ollama client settings with environment values taken from `lookup`.
    ///
    /// Values set in the file win over the environment, which wins over the
    /// built-in defaults.
    pub fn ollama_config_with(&self, lookup: impl Fn(&str) -> Option<String>) -> OllamaConfig {
        let mut config = OllamaConfig::from_lookup(lookup)
            .with_timeout(Duration::from_secs(self.ollama.timeout_secs))
            .with_retry(RetryPolicy::new(
                self.ollama.max_retries,
                Duration::from_millis(self.ollama.retry_backoff_ms),
            ));

        if let Some(url) = &self.ollama.base_url {
            config = config.with_base_url(url.as_str());
        }

        let mut models = config.models.clone();
        if let Some(model) = &self.models.generation {
            models = models.with_generation_model(model.as_str());
        }
        if let Some(model) = &self.models.embedding {
            models = models.with_embedding_model(model.as_str());
        }

        config.with_models(models)
    }

    /// Default contents written by `todd init`.
    pub fn default_file_contents() -> &'static str {
        r#"# todd configuration
# All paths are relative to this .todd/ directory unless absolute

[database]
path = "todd.db"  # Stored in .todd/todd.db

[ollama]
# base_url = "http://127.0.0.1:11434"  # Or use OLLAMA_HOST env var
timeout_secs = 120
max_retries = 2
retry_backoff_ms = 200

# Model overrides (or use TODD_GENERATION_MODEL / TODD_EMBEDDING_MODEL)
[models]
# generation = "gemma2:9b-instruct"
# embedding = "gemma2:2b-instruct"

[indexer]
enabled = true  # Compute vectors after every write
"#
    }
}

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

impl Config {
    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.database.path.as_os_str().is_empty() {
            errors.push(ConfigValidationError {
                field: "database.path".to_string(),
                message: "Database path cannot be empty.".to_string(),
            });
        }

        if let Some(url) = &self.ollama.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ConfigValidationError {
                    field: "ollama.base_url".to_string(),
                    message: format!(
                        "Invalid URL '{}'. Expected an http:// or https:// address.",
                        url
                    ),
                });
            }
        }

        if self.ollama.timeout_secs == 0 {
            errors.push(ConfigValidationError {
                field: "ollama.timeout_secs".to_string(),
                message: "Timeout must be at least one second.".to_string(),
            });
        }

        for (field, model) in [
            ("models.generation", &self.models.generation),
            ("models.embedding", &self.models.embedding),
        ] {
            if model.as_deref().is_some_and(|m| m.trim().is_empty()) {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: "Model name cannot be empty. Remove the entry to use the default."
                        .to_string(),
                });
            }
        }

        errors
    }
}
