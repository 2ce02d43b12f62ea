//! Typed record API for logs, key-value entries, and the node/edge graph.
//!
//! Every successful mutation publishes a [`RowChange`] whose fields use the
//! same names the statement classifier extracts from raw SQL.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde_json::Value;

use crate::changes::{ChangeOp, EntityId, EntityKind, EntityRef, RowChange};
use crate::database::{Database, Result, StoreError};
use crate::sql;
use crate::value::parse_json_text;

/// A row of the `logs` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub level: String,
    pub message: String,
    pub metadata: Value,
    pub created_at: String,
}

/// A row of the `kv` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KvEntry {
    pub key: String,
    pub value: Value,
    pub updated_at: String,
}

/// A row of the `nodes` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub id: i64,
    pub label: Option<String>,
    pub properties: Value,
}

/// A row of the `edges` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: i64,
    pub source_id: Option<i64>,
    pub target_id: Option<i64>,
    pub label: Option<String>,
    pub properties: Value,
    pub directed: bool,
}

/// Column values for creating or updating an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeInput {
    pub source_id: i64,
    pub target_id: i64,
    pub label: Option<String>,
    pub properties: Option<Value>,
    pub directed: bool,
}

impl EdgeInput {
    pub fn new(source_id: i64, target_id: i64) -> Self {
        Self {
            source_id,
            target_id,
            label: None,
            properties: None,
            directed: true,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }

    fn params(&self) -> Vec<Value> {
        vec![
            Value::from(self.source_id),
            Value::from(self.target_id),
            opt_text(self.label.as_deref()),
            self.properties.clone().unwrap_or(Value::Null),
            Value::Bool(self.directed),
        ]
    }
}

impl Database {
    // ─────────────────────────────────────────────────────────────────────────
    // Logs
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a log entry, returning its id.
    pub fn insert_log(&self, level: &str, message: &str, metadata: Option<&Value>) -> Result<i64> {
        let metadata = metadata.cloned().unwrap_or(Value::Null);
        let result = self.execute(
            sql::INSERT_LOG,
            &[Value::from(level), Value::from(message), metadata.clone()],
        )?;
        let id = inserted(result.inserted_id, "logs")?;

        self.publish(log_change(ChangeOp::Insert, id, level, message, metadata));
        Ok(id)
    }

    /// Rewrite a log entry. Returns false when no row has that id.
    pub fn update_log(
        &self,
        id: i64,
        level: &str,
        message: &str,
        metadata: Option<&Value>,
    ) -> Result<bool> {
        let metadata = metadata.cloned().unwrap_or(Value::Null);
        let result = self.execute(
            sql::UPDATE_LOG,
            &[
                Value::from(level),
                Value::from(message),
                metadata.clone(),
                Value::from(id),
            ],
        )?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        self.publish(log_change(ChangeOp::Update, id, level, message, metadata));
        Ok(true)
    }

    pub fn delete_log(&self, id: i64) -> Result<bool> {
        self.delete_row(sql::DELETE_LOG, EntityRef::new(EntityKind::Log, id))
    }

    /// All log entries, newest first.
    pub fn list_logs(&self) -> Result<Vec<LogEntry>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql::SELECT_LOGS)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(LogEntry {
                        id: row.get(0)?,
                        level: row.get(1)?,
                        message: row.get(2)?,
                        metadata: parse_json_text(row.get(3)?),
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key-value entries
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or overwrite a key.
    pub fn set_kv(&self, key: &str, value: &Value) -> Result<()> {
        self.execute(sql::INSERT_KV, &[Value::from(key), value.clone()])?;
        self.publish(kv_change(ChangeOp::Insert, key, value.clone()));
        Ok(())
    }

    /// Overwrite an existing key. Returns false when the key is absent.
    pub fn update_kv(&self, key: &str, value: &Value) -> Result<bool> {
        let result = self.execute(sql::UPDATE_KV, &[value.clone(), Value::from(key)])?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        self.publish(kv_change(ChangeOp::Update, key, value.clone()));
        Ok(true)
    }

    pub fn delete_kv(&self, key: &str) -> Result<bool> {
        self.delete_row(sql::DELETE_KV, EntityRef::new(EntityKind::KeyValue, key))
    }

    pub fn get_kv(&self, key: &str) -> Result<Option<KvEntry>> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT key, value, updated_at FROM kv WHERE key = ?1",
                    params![key],
                    kv_from_row,
                )
                .optional()?)
        })
    }

    /// All entries ordered by key.
    pub fn list_kv(&self) -> Result<Vec<KvEntry>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql::SELECT_KV)?;
            let rows = stmt
                .query_map([], kv_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Graph
    // ─────────────────────────────────────────────────────────────────────────

    pub fn insert_node(&self, label: Option<&str>, properties: Option<&Value>) -> Result<i64> {
        let properties = properties.cloned().unwrap_or(Value::Null);
        let result = self.execute(sql::INSERT_NODE, &[opt_text(label), properties.clone()])?;
        let id = inserted(result.inserted_id, "nodes")?;

        self.publish(node_change(ChangeOp::Insert, id, label, properties));
        Ok(id)
    }

    pub fn update_node(
        &self,
        id: i64,
        label: Option<&str>,
        properties: Option<&Value>,
    ) -> Result<bool> {
        let properties = properties.cloned().unwrap_or(Value::Null);
        let result = self.execute(
            sql::UPDATE_NODE,
            &[opt_text(label), properties.clone(), Value::from(id)],
        )?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        self.publish(node_change(ChangeOp::Update, id, label, properties));
        Ok(true)
    }

    /// Delete a node. Edges referencing it are removed by the foreign key cascade.
    pub fn delete_node(&self, id: i64) -> Result<bool> {
        self.delete_row(sql::DELETE_NODE, EntityRef::new(EntityKind::Node, id))
    }

    pub fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql::SELECT_NODES)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(NodeRecord {
                        id: row.get(0)?,
                        label: row.get(1)?,
                        properties: parse_json_text(row.get(2)?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_edge(&self, edge: &EdgeInput) -> Result<i64> {
        let result = self.execute(sql::INSERT_EDGE, &edge.params())?;
        let id = inserted(result.inserted_id, "edges")?;

        self.publish(edge_change(ChangeOp::Insert, id, edge));
        Ok(id)
    }

    pub fn update_edge(&self, id: i64, edge: &EdgeInput) -> Result<bool> {
        let mut params = edge.params();
        params.push(Value::from(id));

        let result = self.execute(sql::UPDATE_EDGE, &params)?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        self.publish(edge_change(ChangeOp::Update, id, edge));
        Ok(true)
    }

    pub fn delete_edge(&self, id: i64) -> Result<bool> {
        self.delete_row(sql::DELETE_EDGE, EntityRef::new(EntityKind::Edge, id))
    }

    pub fn list_edges(&self) -> Result<Vec<EdgeRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql::SELECT_EDGES)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(EdgeRecord {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        target_id: row.get(2)?,
                        label: row.get(3)?,
                        properties: parse_json_text(row.get(4)?),
                        directed: row.get::<_, Option<bool>>(5)?.unwrap_or(true),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn delete_row(&self, statement: &str, entity: EntityRef) -> Result<bool> {
        let key = match &entity.id {
            EntityId::Int(id) => Value::from(*id),
            EntityId::Text(key) => Value::from(key.as_str()),
        };
        let result = self.execute(statement, &[key])?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        self.publish(RowChange::new(entity, ChangeOp::Delete));
        Ok(true)
    }
}

fn inserted(id: Option<i64>, table: &str) -> Result<i64> {
    id.ok_or_else(|| StoreError::InvalidData(format!("insert into {} returned no row id", table)))
}

fn opt_text(text: Option<&str>) -> Value {
    text.map(Value::from).unwrap_or(Value::Null)
}

fn kv_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<KvEntry> {
    Ok(KvEntry {
        key: row.get(0)?,
        value: parse_json_text(row.get(1)?),
        updated_at: row.get(2)?,
    })
}

fn log_change(op: ChangeOp, id: i64, level: &str, message: &str, metadata: Value) -> RowChange {
    RowChange::new(EntityRef::new(EntityKind::Log, id), op)
        .with_field("level", Value::from(level))
        .with_field("message", Value::from(message))
        .with_field("metadata", metadata)
}

fn kv_change(op: ChangeOp, key: &str, value: Value) -> RowChange {
    RowChange::new(EntityRef::new(EntityKind::KeyValue, key), op)
        .with_field("key", Value::from(key))
        .with_field("value", value)
}

fn node_change(op: ChangeOp, id: i64, label: Option<&str>, properties: Value) -> RowChange {
    RowChange::new(EntityRef::new(EntityKind::Node, id), op)
        .with_field("label", opt_text(label))
        .with_field("properties", properties)
}

fn edge_change(op: ChangeOp, id: i64, edge: &EdgeInput) -> RowChange {
    RowChange::new(EntityRef::new(EntityKind::Edge, id), op)
        .with_field("source_id", Value::from(edge.source_id))
        .with_field("target_id", Value::from(edge.target_id))
        .with_field("label", opt_text(edge.label.as_deref()))
        .with_field("properties", edge.properties.clone().unwrap_or(Value::Null))
        .with_field("directed", Value::Bool(edge.directed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_crud_publishes_changes() {
        let db = Database::open_in_memory().unwrap();
        let mut feed = db.subscribe();

        let id = db
            .insert_log("info", "build finished", Some(&json!({"job": 7})))
            .unwrap();
        assert!(db.update_log(id, "warn", "build flaky", None).unwrap());
        assert!(db.delete_log(id).unwrap());
        assert!(!db.delete_log(id).unwrap());

        let changes = feed.drain();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].op, ChangeOp::Insert);
        assert_eq!(changes[0].entity, EntityRef::new(EntityKind::Log, id));
        assert_eq!(changes[0].field("metadata"), &json!({"job": 7}));
        assert_eq!(changes[1].field("message"), &json!("build flaky"));
        assert_eq!(changes[1].field("metadata"), &Value::Null);
        assert_eq!(changes[2].op, ChangeOp::Delete);
    }

    #[test]
    fn test_update_missing_row_publishes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let mut feed = db.subscribe();

        assert!(!db.update_log(5, "info", "nope", None).unwrap());
        assert!(!db.update_kv("absent", &json!(1)).unwrap());
        assert!(!db.update_node(5, Some("x"), None).unwrap());
        assert!(feed.drain().is_empty());
    }

    #[test]
    fn test_kv_set_is_insert_or_update() {
        let db = Database::open_in_memory().unwrap();
        db.set_kv("feature_x", &json!({"enabled": false})).unwrap();
        db.set_kv("feature_x", &json!({"enabled": true})).unwrap();

        let entries = db.list_kv().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, json!({"enabled": true}));

        let entry = db.get_kv("feature_x").unwrap().unwrap();
        assert_eq!(entry.key, "feature_x");
        assert!(db.get_kv("other").unwrap().is_none());
    }

    #[test]
    fn test_kv_change_uses_key_as_id() {
        let db = Database::open_in_memory().unwrap();
        let mut feed = db.subscribe();
        db.set_kv("theme", &json!("dark")).unwrap();

        let change = feed.drain().remove(0);
        assert_eq!(change.entity.id, EntityId::Text("theme".to_string()));
        assert_eq!(change.field("key"), &json!("theme"));
        assert_eq!(change.field("value"), &json!("dark"));
    }

    #[test]
    fn test_graph_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_node(Some("a"), Some(&json!({"x": 1}))).unwrap();
        let b = db.insert_node(Some("b"), None).unwrap();

        let edge = EdgeInput::new(a, b)
            .with_label("links")
            .with_properties(json!({"weight": 2}));
        let edge_id = db.insert_edge(&edge).unwrap();

        let nodes = db.list_nodes().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].properties, json!({"x": 1}));
        assert_eq!(nodes[1].properties, Value::Null);

        let edges = db.list_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, edge_id);
        assert_eq!(edges[0].source_id, Some(a));
        assert_eq!(edges[0].label.as_deref(), Some("links"));
        assert!(edges[0].directed);

        assert!(db.update_edge(edge_id, &edge.clone().undirected()).unwrap());
        assert!(!db.list_edges().unwrap()[0].directed);
    }

    #[test]
    fn test_delete_node_cascades_edges() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_node(Some("a"), None).unwrap();
        let b = db.insert_node(Some("b"), None).unwrap();
        db.insert_edge(&EdgeInput::new(a, b)).unwrap();

        assert!(db.delete_node(a).unwrap());
        assert!(db.list_edges().unwrap().is_empty());
    }

    #[test]
    fn test_edge_change_fields() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_node(Some("a"), None).unwrap();
        let b = db.insert_node(Some("b"), None).unwrap();
        let mut feed = db.subscribe();

        db.insert_edge(&EdgeInput::new(a, b).with_label("calls")).unwrap();

        let change = feed.drain().remove(0);
        assert_eq!(change.entity.kind, EntityKind::Edge);
        assert_eq!(change.field("source_id"), &json!(a));
        assert_eq!(change.field("target_id"), &json!(b));
        assert_eq!(change.field("label"), &json!("calls"));
        assert_eq!(change.field("directed"), &json!(true));
    }

    #[test]
    fn test_list_logs_newest_first() {
        let db = Database::open_in_memory().unwrap();
        db.insert_log("info", "first", None).unwrap();
        db.insert_log("error", "second", None).unwrap();

        let logs = db.list_logs().unwrap();
        assert_eq!(logs[0].message, "second");
        assert_eq!(logs[1].message, "first");
    }
}
