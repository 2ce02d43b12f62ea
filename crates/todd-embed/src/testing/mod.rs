//! Testing utilities for todd-embed.
//!
//! - [`mock_server`]: HTTP server speaking enough of the Ollama API for client tests

pub mod mock_server;

pub use mock_server::MockOllamaServer;
