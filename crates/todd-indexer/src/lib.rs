//! todd-indexer: vector side effects for store mutations
//!
//! - Statement shapes and the classifier that recognizes raw SQL writes
//! - Content builder producing the text to embed for a row
//! - Orchestrator tying classification, embedding and vector storage together
//! - Statement runner returning a uniform response for reads and writes

pub mod classifier;
pub mod content;
pub mod error;
pub mod orchestrator;
pub mod shapes;
pub mod sink;
pub mod statement;

pub use classifier::{StatementClassifier, classify, normalize_sql};
pub use content::{build_content, stringify_structured};
pub use error::{IndexError, Result};
pub use orchestrator::{IndexStats, SideEffectOutcome, VectorIndexer};
pub use shapes::{IdRule, ShapeRegistry, StatementShape, placeholder_count};
pub use sink::{MemorySink, SharedSink, VectorSink};
pub use statement::{StatementResponse, run_statement};
