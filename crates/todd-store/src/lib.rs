//! todd-store: local SQLite storage
//!
//! This crate provides the primary data store for todd:
//! - An explicit database session with open/close lifecycle
//! - Raw statement execution with JSON parameters and row results
//! - Typed records for logs, key-value entries, nodes, and edges
//! - A row change feed published by the typed records
//! - The `vectors` side table keyed by (kind, id)

pub mod changes;
pub mod database;
pub mod records;
pub mod sql;
pub mod value;
pub mod vectors;

pub use changes::{ChangeFeed, ChangeOp, EntityId, EntityKind, EntityRef, FieldMap, RowChange};
pub use database::{Database, ExecutionResult, Result, StatementOutput, StoreError};
pub use records::{EdgeInput, EdgeRecord, KvEntry, LogEntry, NodeRecord};
pub use value::Row;
pub use vectors::VectorRecord;
