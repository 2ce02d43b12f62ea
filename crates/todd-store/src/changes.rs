//! Typed row change events.
//!
//! The typed record API publishes a [`RowChange`] for every successful
//! mutation. Consumers subscribe through [`crate::Database::subscribe`] and
//! receive the events on a [`ChangeFeed`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Named field values carried by a change, keyed by column name.
pub type FieldMap = BTreeMap<String, Value>;

/// The logical tables that can own a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Log,
    Node,
    Edge,
    #[serde(rename = "kv")]
    KeyValue,
}

impl EntityKind {
    /// All kinds, in table order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Log,
        EntityKind::Node,
        EntityKind::Edge,
        EntityKind::KeyValue,
    ];

    /// The value stored in `vectors.item_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Log => "log",
            EntityKind::Node => "node",
            EntityKind::Edge => "edge",
            EntityKind::KeyValue => "kv",
        }
    }

    /// The primary table holding rows of this kind.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Log => "logs",
            EntityKind::Node => "nodes",
            EntityKind::Edge => "edges",
            EntityKind::KeyValue => "kv",
        }
    }

    /// The primary key column of [`EntityKind::table`].
    pub fn key_column(self) -> &'static str {
        match self {
            EntityKind::KeyValue => "key",
            _ => "id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" | "logs" => Ok(EntityKind::Log),
            "node" | "nodes" => Ok(EntityKind::Node),
            "edge" | "edges" => Ok(EntityKind::Edge),
            "kv" | "keyvalue" => Ok(EntityKind::KeyValue),
            other => Err(format!(
                "unknown entity kind '{}'. Expected log, node, edge, or kv.",
                other
            )),
        }
    }
}

/// Row identifier: generated integer ids or text keys (kv).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl EntityId {
    /// Interpret a bound parameter as an identifier.
    ///
    /// Integers and non-empty strings are accepted; anything else is `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Int),
            Value::String(s) if !s.is_empty() => Some(EntityId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{}", id),
            EntityId::Text(key) => f.write_str(key),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(key: &str) -> Self {
        EntityId::Text(key.to_string())
    }
}

impl From<String> for EntityId {
    fn from(key: String) -> Self {
        EntityId::Text(key)
    }
}

/// Identifies the logical row a vector belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// The kind of mutation a change records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A committed mutation of one logical row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub entity: EntityRef,
    pub op: ChangeOp,
    pub fields: FieldMap,
}

impl RowChange {
    pub fn new(entity: EntityRef, op: ChangeOp) -> Self {
        Self {
            entity,
            op,
            fields: FieldMap::new(),
        }
    }

    /// Attach a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Look up a field, treating absent as `null`.
    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }
}

/// Receiving end of the change feed.
#[derive(Debug)]
pub struct ChangeFeed {
    rx: UnboundedReceiver<RowChange>,
}

impl ChangeFeed {
    /// Wait for the next change.
    ///
    /// Returns `None` once every database handle holding the sender is gone.
    pub async fn recv(&mut self) -> Option<RowChange> {
        self.rx.recv().await
    }

    /// Take every change already queued without waiting.
    pub fn drain(&mut self) -> Vec<RowChange> {
        let mut changes = Vec::new();
        while let Ok(change) = self.rx.try_recv() {
            changes.push(change);
        }
        changes
    }
}

/// Fan-out of row changes to every live subscriber.
#[derive(Debug, Clone, Default)]
pub(crate) struct Outbox {
    subscribers: Arc<Mutex<Vec<UnboundedSender<RowChange>>>>,
}

impl Outbox {
    pub(crate) fn subscribe(&self) -> ChangeFeed {
        let (tx, rx) = unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        ChangeFeed { rx }
    }

    pub(crate) fn publish(&self, change: RowChange) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            tracing::warn!(entity = %change.entity, "Change outbox lock poisoned, dropping event");
            return;
        };

        // Closed feeds are pruned as they are discovered.
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub(crate) fn close(&self) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.clear();
        }
    }
}
