//! Integration tests for todd-store
//!
//! Exercises the public API against an on-disk database.

use serde_json::{Value, json};
use todd_store::{ChangeOp, Database, EdgeInput, EntityKind, EntityRef, StoreError};

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todd.db");

    let db = Database::open(&path).unwrap();
    let id = db.insert_log("info", "persisted", None).unwrap();
    db.upsert_vector(&EntityRef::new(EntityKind::Log, id), &[0.5, 0.25])
        .unwrap();
    db.close().unwrap();

    let db = Database::open(&path).unwrap();
    assert_eq!(db.list_logs().unwrap()[0].message, "persisted");
    let record = db
        .get_vector(&EntityRef::new(EntityKind::Log, id))
        .unwrap()
        .unwrap();
    assert_eq!(record.vector, vec![0.5, 0.25]);
    assert_eq!(db.path(), Some(path.as_path()));
}

#[test]
fn subscribers_see_changes_from_any_clone() {
    let db = Database::open_in_memory().unwrap();
    let mut feed = db.subscribe();
    let writer = db.clone();

    let a = writer.insert_node(Some("a"), None).unwrap();
    let b = writer.insert_node(Some("b"), None).unwrap();
    writer.insert_edge(&EdgeInput::new(a, b)).unwrap();
    writer.delete_node(b).unwrap();

    let ops: Vec<_> = feed
        .drain()
        .into_iter()
        .map(|c| (c.entity.kind, c.op))
        .collect();
    assert_eq!(
        ops,
        vec![
            (EntityKind::Node, ChangeOp::Insert),
            (EntityKind::Node, ChangeOp::Insert),
            (EntityKind::Edge, ChangeOp::Insert),
            (EntityKind::Node, ChangeOp::Delete),
        ]
    );
}

#[test]
fn raw_statements_do_not_publish() {
    let db = Database::open_in_memory().unwrap();
    let mut feed = db.subscribe();

    db.execute(
        "INSERT INTO logs (level, message, metadata) VALUES (?, ?, ?)",
        &[json!("info"), json!("raw"), Value::Null],
    )
    .unwrap();

    assert!(feed.drain().is_empty());
}

#[test]
fn edge_to_missing_node_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let result = db.insert_edge(&EdgeInput::new(1, 2));
    assert!(matches!(result, Err(StoreError::Database(_))));
}

#[tokio::test]
async fn feed_closes_with_database() {
    let db = Database::open_in_memory().unwrap();
    let mut feed = db.subscribe();
    db.set_kv("k", &json!("v")).unwrap();
    db.close().unwrap();

    assert!(feed.recv().await.is_some());
    assert!(feed.recv().await.is_none());
}
