//! Cross-crate integration and E2E tests
//!
//! These tests wire the store, the Ollama client and the indexer together
//! against a local HTTP stand-in for Ollama.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::{Value, json};
use tokio::sync::oneshot;

use todd_embed::{FailureClass, OllamaClient, OllamaConfig, RetryPolicy};
use todd_indexer::{IndexStats, VectorIndexer, run_statement};
use todd_store::{Database, EdgeInput, EntityKind, EntityRef};

#[derive(Default)]
struct StubState {
    failures: Mutex<VecDeque<u16>>,
    prompts: Mutex<Vec<String>>,
}

/// Minimal Ollama stand-in: fails with the queued statuses, then embeds.
///
/// The vector encodes the prompt length so tests can tell rows apart.
struct OllamaStub {
    addr: SocketAddr,
    state: Arc<StubState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl OllamaStub {
    async fn start(failures: &[u16]) -> Self {
        let state = Arc::new(StubState {
            failures: Mutex::new(failures.iter().copied().collect()),
            ..StubState::default()
        });

        let app = Router::new()
            .route("/api/embeddings", post(embeddings))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn client(&self) -> OllamaClient {
        let config = OllamaConfig::new()
            .with_base_url(format!("http://{}", self.addr))
            .with_retry(RetryPolicy::new(2, Duration::from_millis(5)));
        OllamaClient::new(config).unwrap()
    }

    fn prompts(&self) -> Vec<String> {
        self.state.prompts.lock().unwrap().clone()
    }

    fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn embeddings(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    state.prompts.lock().unwrap().push(prompt.clone());

    if let Some(status) = state.failures.lock().unwrap().pop_front() {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, Json(json!({"error": "model is loading"})));
    }

    (
        StatusCode::OK,
        Json(json!({"embedding": [prompt.len() as f32, 1.0]})),
    )
}

/// E2E: a raw insert survives two 503s and ends with a stored vector.
#[tokio::test]
async fn test_e2e_exec_with_transient_failures() {
    let stub = OllamaStub::start(&[503, 503]).await;
    let db = Database::open_in_memory().unwrap();
    let indexer = VectorIndexer::new(Arc::new(stub.client()), Arc::new(db.clone())).unwrap();

    let response = run_statement(
        &db,
        Some(&indexer),
        "INSERT INTO logs (level, message, metadata) VALUES (?, ?, ?)",
        &[json!("info"), json!("build finished"), Value::Null],
    )
    .await;

    assert!(response.success);
    assert!(response.vectors_updated, "warning: {:?}", response.warning);
    assert_eq!(stub.prompts(), vec!["build finished"; 3]);

    let id = response.inserted_id.unwrap();
    let record = db
        .get_vector(&EntityRef::new(EntityKind::Log, id))
        .unwrap()
        .unwrap();
    assert_eq!(record.vector, vec![14.0, 1.0]);

    stub.shutdown();
}

/// E2E: a permanent model error is reported as a warning and the row stays.
#[tokio::test]
async fn test_e2e_model_error_is_a_warning() {
    let stub = OllamaStub::start(&[404]).await;
    let db = Database::open_in_memory().unwrap();
    let indexer = VectorIndexer::new(Arc::new(stub.client()), Arc::new(db.clone())).unwrap();
    db.set_kv("theme", &json!("light")).unwrap();

    let response = run_statement(
        &db,
        Some(&indexer),
        "UPDATE kv SET value = ? WHERE key = ?",
        &[json!("dark"), json!("theme")],
    )
    .await;

    assert!(response.success);
    assert_eq!(response.rows_affected, 1);
    assert!(!response.vectors_updated);
    assert!(response.warning.unwrap().contains("404"));
    assert_eq!(stub.prompts(), vec!["theme\ndark"]);
    assert_eq!(db.count_vectors().unwrap(), 0);
    assert_eq!(db.get_kv("theme").unwrap().unwrap().value, json!("dark"));

    stub.shutdown();
}

/// E2E: Ollama is down entirely.
#[tokio::test]
async fn test_e2e_unreachable_service() {
    let config = OllamaConfig::new()
        .with_base_url("http://127.0.0.1:1")
        .with_retry(RetryPolicy::new(1, Duration::from_millis(1)));
    let client = OllamaClient::new(config).unwrap();

    let err = todd_embed::EmbeddingBackend::embed(&client, "hello")
        .await
        .unwrap_err();
    assert_eq!(err.class(), FailureClass::ServiceUnreachable);

    let db = Database::open_in_memory().unwrap();
    let indexer = VectorIndexer::new(Arc::new(client), Arc::new(db.clone())).unwrap();
    let id = db.insert_node(Some("offline"), None).unwrap();
    let response = run_statement(
        &db,
        Some(&indexer),
        "UPDATE nodes SET label = ?, properties = ? WHERE id = ?",
        &[json!("still offline"), Value::Null, json!(id)],
    )
    .await;

    assert!(response.success);
    assert!(!response.vectors_updated);
    assert!(response.warning.is_some());
    assert_eq!(db.list_nodes().unwrap()[0].label.as_deref(), Some("still offline"));
}

/// E2E: typed writes flow through the change feed into the vectors table.
#[tokio::test]
async fn test_e2e_typed_api_through_change_feed() {
    let stub = OllamaStub::start(&[]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todd.db");

    let writer = Database::open(&path).unwrap();
    let feed = writer.subscribe();
    let vectors = Database::open(&path).unwrap();
    let indexer = VectorIndexer::new(Arc::new(stub.client()), Arc::new(vectors.clone())).unwrap();
    let task = tokio::spawn(async move { indexer.run_feed(feed).await });

    let api = writer.insert_node(Some("api"), None).unwrap();
    let store = writer
        .insert_node(Some("store"), Some(&json!({"engine": "sqlite"})))
        .unwrap();
    writer
        .insert_edge(&EdgeInput::new(api, store).with_label("writes"))
        .unwrap();
    writer.set_kv("feature_x", &json!({"enabled": true})).unwrap();
    writer.delete_node(api).unwrap();
    writer.close().unwrap();

    let stats = task.await.unwrap();
    assert_eq!(
        stats,
        IndexStats {
            processed: 5,
            updated: 4,
            failed: 0
        }
    );

    let mut prompts = stub.prompts();
    prompts.sort();
    assert_eq!(
        prompts,
        vec![
            "api".to_string(),
            "feature_x\n{\"enabled\":true}".to_string(),
            "store\n{\"engine\":\"sqlite\"}".to_string(),
            "writes\nedge:1->2".to_string(),
        ]
    );

    // The node delete cascaded to the edge; both vectors are now orphans.
    assert_eq!(vectors.count_vectors().unwrap(), 4);
    assert_eq!(vectors.prune_orphaned_vectors().unwrap(), 2);
    let remaining: Vec<_> = vectors
        .list_vectors(None)
        .unwrap()
        .into_iter()
        .map(|r| r.entity)
        .collect();
    assert!(remaining.contains(&EntityRef::new(EntityKind::Node, store)));
    assert!(remaining.contains(&EntityRef::new(EntityKind::KeyValue, "feature_x")));

    stub.shutdown();
}
