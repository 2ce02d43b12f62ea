//! HTTP mock of the Ollama API.
//!
//! Scripted replies are served in order to any POST endpoint. Once the script
//! runs out each endpoint falls back to a canned success.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<(u16, Value)>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl MockState {
    fn reply(&self, path: &str, body: Value, fallback: Value) -> (StatusCode, Json<Value>) {
        self.requests.lock().unwrap().push((path.to_string(), body));

        let (status, body) = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((200, fallback));
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body))
    }
}

/// A local HTTP server standing in for Ollama.
pub struct MockOllamaServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockOllamaServer {
    /// Start a new mock server on a random available port.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/api/embeddings", post(handle_embeddings))
            .route("/api/generate", post(handle_generate))
            .route("/api/tags", get(handle_tags))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to get local address");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
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
            handle: Some(handle),
        }
    }

    /// Get the server's base URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a reply for the next POST request.
    pub fn queue(&self, status: u16, body: Value) {
        self.state.replies.lock().unwrap().push_back((status, body));
    }

    /// Captured `(path, body)` pairs in arrival order.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Shutdown the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Handle POST /api/embeddings
async fn handle_embeddings(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.reply("/api/embeddings", body, json!({"embedding": [0.1, 0.2, 0.3]}))
}

/// Handle POST /api/generate
async fn handle_generate(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let model = body["model"].clone();
    state.reply(
        "/api/generate",
        body,
        json!({"model": model, "response": "ok", "done": true}),
    )
}

/// Handle GET /api/tags
async fn handle_tags(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state
        .requests
        .lock()
        .unwrap()
        .push(("/api/tags".to_string(), Value::Null));
    Json(json!({"models": [{"name": "gemma2:2b-instruct"}]}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_start_and_shutdown() {
        let server = MockOllamaServer::start().await;
        assert!(server.url().starts_with("http://127.0.0.1:"));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_scripted_reply_then_fallback() {
        let server = MockOllamaServer::start().await;
        server.queue(503, json!({"error": "busy"}));

        let client = reqwest::Client::new();
        let url = format!("{}/api/embeddings", server.url());

        let first = client
            .post(&url)
            .json(&json!({"model": "m", "prompt": "p"}))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), 503);

        let second = client
            .post(&url)
            .json(&json!({"model": "m", "prompt": "p"}))
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), 200);
        let body: Value = second.json().await.unwrap();
        assert_eq!(body["embedding"], json!([0.1, 0.2, 0.3]));

        assert_eq!(server.request_count(), 2);
        server.shutdown().await;
    }
}
