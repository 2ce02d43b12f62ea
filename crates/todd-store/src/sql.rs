//! Canonical statements used by the typed record API.
//!
//! Parameter order here is the contract the statement classifier reads
//! positions from, so these strings are also validated by the indexer at
//! startup.

/// Schema applied on every open. Idempotent.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    metadata TEXT,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT,
    properties TEXT
);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER REFERENCES nodes(id) ON DELETE CASCADE,
    target_id INTEGER REFERENCES nodes(id) ON DELETE CASCADE,
    label TEXT,
    properties TEXT,
    directed BOOLEAN DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS vectors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_type TEXT NOT NULL,
    item_id TEXT NOT NULL,
    vector TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (item_type, item_id)
);
";

pub const INSERT_LOG: &str = "INSERT INTO logs (level, message, metadata) VALUES (?, ?, ?)";
pub const UPDATE_LOG: &str = "UPDATE logs SET level = ?, message = ?, metadata = ? WHERE id = ?";
pub const DELETE_LOG: &str = "DELETE FROM logs WHERE id = ?";
pub const SELECT_LOGS: &str =
    "SELECT id, level, message, metadata, created_at FROM logs ORDER BY created_at DESC, id DESC";

pub const INSERT_KV: &str = "INSERT INTO kv (key, value) VALUES (?, ?) \
     ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP";
pub const UPDATE_KV: &str =
    "UPDATE kv SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?";
pub const DELETE_KV: &str = "DELETE FROM kv WHERE key = ?";
pub const SELECT_KV: &str = "SELECT key, value, updated_at FROM kv ORDER BY key ASC";

pub const INSERT_NODE: &str = "INSERT INTO nodes (label, properties) VALUES (?, ?)";
pub const UPDATE_NODE: &str = "UPDATE nodes SET label = ?, properties = ? WHERE id = ?";
pub const DELETE_NODE: &str = "DELETE FROM nodes WHERE id = ?";
pub const SELECT_NODES: &str = "SELECT id, label, properties FROM nodes ORDER BY id ASC";

pub const INSERT_EDGE: &str = "INSERT INTO edges (source_id, target_id, label, properties, directed) \
     VALUES (?, ?, ?, ?, ?)";
pub const UPDATE_EDGE: &str = "UPDATE edges SET source_id = ?, target_id = ?, label = ?, \
     properties = ?, directed = ? WHERE id = ?";
pub const DELETE_EDGE: &str = "DELETE FROM edges WHERE id = ?";
pub const SELECT_EDGES: &str =
    "SELECT id, source_id, target_id, label, properties, directed FROM edges ORDER BY id ASC";

pub const UPSERT_VECTOR: &str = "INSERT INTO vectors (item_type, item_id, vector, created_at) \
     VALUES (?1, ?2, ?3, ?4) \
     ON CONFLICT (item_type, item_id) DO UPDATE SET \
     vector = excluded.vector, created_at = excluded.created_at";

/// Every insert/update statement that can produce a vector side effect.
pub const INDEXED_MUTATIONS: &[&str] = &[
    INSERT_LOG,
    UPDATE_LOG,
    INSERT_NODE,
    UPDATE_NODE,
    INSERT_EDGE,
    UPDATE_EDGE,
    INSERT_KV,
    UPDATE_KV,
];
