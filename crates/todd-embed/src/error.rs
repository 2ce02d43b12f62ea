//! Error types for the embedding client.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors that can occur while talking to the model service.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    /// Connection refused, DNS failure, or timeout.
    #[error("Embedding service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with a non-success status.
    #[error("Model service error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The service answered 2xx with a body we could not use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request was rejected before it was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification reported once an embedding request has failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The service could not be reached at all.
    ServiceUnreachable,
    /// The service was reached and reported an error.
    ModelError,
    /// Anything else.
    Unknown,
}

impl EmbedError {
    /// Whether retrying the same request may succeed.
    ///
    /// Network failures and 5xx responses are transient. Everything else is
    /// returned to the caller immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Unreachable(_) => true,
            EmbedError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            EmbedError::Unreachable(_) => FailureClass::ServiceUnreachable,
            EmbedError::Status { .. } => FailureClass::ModelError,
            _ => FailureClass::Unknown,
        }
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            EmbedError::InvalidResponse(e.to_string())
        } else if e.is_builder() {
            EmbedError::InvalidRequest(e.to_string())
        } else {
            EmbedError::Unreachable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for EmbedError {
    fn from(e: serde_json::Error) -> Self {
        EmbedError::InvalidResponse(e.to_string())
    }
}
