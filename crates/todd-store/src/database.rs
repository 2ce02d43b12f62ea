//! Database session handle.
//!
//! A [`Database`] owns one SQLite connection for its whole lifetime. Clones
//! share the connection; [`Database::close`] ends it explicitly.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use serde_json::Value;

use crate::changes::{ChangeFeed, Outbox, RowChange};
use crate::sql;
use crate::value::{self, Row};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Database handle still shared by {0} other owner(s)")]
    InUse(usize),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Metadata about a completed statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Rows inserted, updated, or deleted.
    pub rows_affected: u64,
    /// Generated row id for insert statements that wrote a row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_id: Option<i64>,
}

impl ExecutionResult {
    pub fn new(rows_affected: u64, inserted_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            inserted_id,
        }
    }
}

/// Everything a statement produced.
#[derive(Debug, Clone, Default)]
pub struct StatementOutput {
    pub rows: Vec<Row>,
    /// True when SQLite reports the statement cannot write.
    pub read_only: bool,
    pub result: ExecutionResult,
}

/// A shared SQLite session.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    outbox: Outbox,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create a database at the specified path and apply the schema.
    ///
    /// Parent directories are created as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Create an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", 1)?;
        conn.execute_batch(sql::SCHEMA)?;

        tracing::debug!(path = ?path, "Database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            outbox: Outbox::default(),
            path,
        })
    }

    /// Check that a database can be opened at `path`, then close it again.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::open(path)?.close()
    }

    /// Close the connection.
    ///
    /// Fails with [`StoreError::InUse`] while other clones of this handle are
    /// alive; those clones keep working.
    pub fn close(self) -> Result<()> {
        let Self { conn, outbox, path } = self;

        let mutex = Arc::try_unwrap(conn)
            .map_err(|shared| StoreError::InUse(Arc::strong_count(&shared) - 1))?;
        let conn = mutex.into_inner().map_err(|_| StoreError::Poisoned)?;

        outbox.close();
        conn.close().map_err(|(_, e)| StoreError::Database(e))?;

        tracing::debug!(path = ?path, "Database closed");
        Ok(())
    }

    /// Path of the database file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Subscribe to row changes published by the typed record API.
    pub fn subscribe(&self) -> ChangeFeed {
        self.outbox.subscribe()
    }

    pub(crate) fn publish(&self, change: RowChange) {
        tracing::trace!(entity = %change.entity, op = ?change.op, "Publishing row change");
        self.outbox.publish(change);
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Run `f` inside a transaction, committing on success.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Execute one or more statements without parameters.
    pub fn exec(&self, sql: &str) -> Result<()> {
        self.with_connection(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Run a statement and return its rows.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        Ok(self.run(sql, params)?.rows)
    }

    /// Run a statement and return its execution metadata.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecutionResult> {
        Ok(self.run(sql, params)?.result)
    }

    /// Run a single statement with positional parameters.
    ///
    /// Works for reads, writes, and writes with a `RETURNING` clause.
    pub fn run(&self, sql: &str, params: &[Value]) -> Result<StatementOutput> {
        let bound: Vec<SqlValue> = params.iter().map(value::to_sql).collect();

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let read_only = stmt.readonly();
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let rowid_before = conn.last_insert_rowid();

            let mut rows = Vec::new();
            let mut cursor = stmt.query(params_from_iter(bound.iter()))?;
            while let Some(row) = cursor.next()? {
                let mut record = Row::new();
                for (idx, name) in columns.iter().enumerate() {
                    record.insert(name.clone(), value::from_sql(row.get_ref(idx)?));
                }
                rows.push(record);
            }
            drop(cursor);

            // `changes()` is only updated by DML; DDL leaves the previous count.
            let result = if read_only || !is_dml(sql) {
                ExecutionResult::default()
            } else {
                let rows_affected = conn.changes() as u64;
                // An upsert that took its DO UPDATE branch leaves the rowid untouched.
                let rowid = conn.last_insert_rowid();
                let inserted_id = (starts_with_keyword(sql, "insert")
                    && rows_affected > 0
                    && rowid != rowid_before)
                    .then_some(rowid);
                ExecutionResult::new(rows_affected, inserted_id)
            };

            Ok(StatementOutput {
                rows,
                read_only,
                result,
            })
        })
    }

    pub fn begin(&self) -> Result<()> {
        self.exec("BEGIN")
    }

    pub fn commit(&self) -> Result<()> {
        self.exec("COMMIT")
    }

    pub fn rollback(&self) -> Result<()> {
        self.exec("ROLLBACK")
    }

    /// True while an explicit transaction is open.
    pub fn in_transaction(&self) -> Result<bool> {
        self.with_connection(|conn| Ok(!conn.is_autocommit()))
    }
}

fn is_dml(sql: &str) -> bool {
    ["insert", "update", "delete", "replace", "with"]
        .iter()
        .any(|keyword| starts_with_keyword(sql, keyword))
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    sql.trim_start()
        .get(..keyword.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_in_memory_applies_schema() {
        let db = Database::open_in_memory().unwrap();
        let tables = db
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .unwrap();
        let names: Vec<_> = tables.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(
            names,
            vec![json!("edges"), json!("kv"), json!("logs"), json!("nodes"), json!("vectors")]
        );
    }

    #[test]
    fn test_execute_reports_inserted_id() {
        let db = Database::open_in_memory().unwrap();
        let result = db
            .execute(sql::INSERT_LOG, &[json!("info"), json!("hello"), Value::Null])
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.inserted_id, Some(1));

        let result = db
            .execute(sql::UPDATE_LOG, &[json!("warn"), json!("hello"), Value::Null, json!(1)])
            .unwrap();
        assert_eq!(result, ExecutionResult::new(1, None));
    }

    #[test]
    fn test_run_select_is_read_only() {
        let db = Database::open_in_memory().unwrap();
        db.execute(sql::INSERT_NODE, &[json!("a"), Value::Null]).unwrap();

        let output = db.run(sql::SELECT_NODES, &[]).unwrap();
        assert!(output.read_only);
        assert_eq!(output.result, ExecutionResult::default());
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.rows[0]["label"], json!("a"));
    }

    #[test]
    fn test_run_returning_clause() {
        let db = Database::open_in_memory().unwrap();
        let output = db
            .run(
                "INSERT INTO kv (key, value) VALUES (?, ?) RETURNING key",
                &[json!("theme"), json!("dark")],
            )
            .unwrap();
        assert!(!output.read_only);
        assert_eq!(output.rows[0]["key"], json!("theme"));
        assert_eq!(output.result.rows_affected, 1);
    }

    #[test]
    fn test_structured_params_stored_as_json_text() {
        let db = Database::open_in_memory().unwrap();
        db.execute(sql::INSERT_NODE, &[json!("cfg"), json!({"depth": 2})])
            .unwrap();
        let rows = db.query("SELECT properties FROM nodes", &[]).unwrap();
        assert_eq!(rows[0]["properties"], json!(r#"{"depth":2}"#));
    }

    #[test]
    fn test_explicit_transaction_rollback() {
        let db = Database::open_in_memory().unwrap();
        db.begin().unwrap();
        assert!(db.in_transaction().unwrap());
        db.execute(sql::INSERT_NODE, &[json!("temp"), Value::Null]).unwrap();
        db.rollback().unwrap();
        assert!(!db.in_transaction().unwrap());

        assert!(db.query(sql::SELECT_NODES, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_closure_commits() {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|conn| {
            conn.execute("INSERT INTO nodes (label) VALUES ('x')", [])?;
            conn.execute("INSERT INTO nodes (label) VALUES ('y')", [])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(db.query(sql::SELECT_NODES, &[]).unwrap().len(), 2);
    }

    #[test]
    fn test_close_refuses_while_shared() {
        let db = Database::open_in_memory().unwrap();
        let other = db.clone();
        assert!(matches!(db.close(), Err(StoreError::InUse(1))));
        other.close().unwrap();
    }

    #[test]
    fn test_probe_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("todd.db");
        Database::probe(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_bad_sql_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.execute("INSERT INTO missing VALUES (?)", &[json!(1)]),
            Err(StoreError::Database(_))
        ));
    }

    #[test]
    fn test_ddl_reports_no_affected_rows() {
        let db = Database::open_in_memory().unwrap();
        db.execute(sql::INSERT_LOG, &[json!("info"), json!("hello"), Value::Null])
            .unwrap();

        let output = db.run("CREATE TABLE scratch (x)", &[]).unwrap();
        assert!(!output.read_only);
        assert_eq!(output.result, ExecutionResult::default());

        let result = db.execute("DROP TABLE scratch", &[]).unwrap();
        assert_eq!(result.rows_affected, 0);
    }

    #[test]
    fn test_upsert_update_branch_has_no_inserted_id() {
        let db = Database::open_in_memory().unwrap();
        db.execute(sql::INSERT_KV, &[json!("theme"), json!("dark")])
            .unwrap();
        for label in ["a", "b", "c", "d", "e"] {
            db.execute(sql::INSERT_NODE, &[json!(label), Value::Null])
                .unwrap();
        }

        let result = db
            .execute(sql::INSERT_KV, &[json!("theme"), json!("light")])
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.inserted_id, None);

        let result = db
            .execute(sql::INSERT_KV, &[json!("font"), json!("mono")])
            .unwrap();
        assert!(result.inserted_id.is_some());
    }

    #[test]
    fn test_is_dml() {
        assert!(is_dml("delete from kv"));
        assert!(is_dml("  UPDATE nodes SET label = 'x'"));
        assert!(!is_dml("CREATE TABLE t (x)"));
        assert!(!is_dml("ALTER TABLE t ADD COLUMN y"));
    }

    #[test]
    fn test_starts_with_keyword() {
        assert!(starts_with_keyword("  INSERT INTO logs", "insert"));
        assert!(!starts_with_keyword("UPDATE logs", "insert"));
        assert!(!starts_with_keyword("ins", "insert"));
    }
}
