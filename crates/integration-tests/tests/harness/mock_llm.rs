//! Mock upstream backends for integration tests
//!
//! Serves a minimal OpenAI-compatible `chat/completions` route and a Gemini
//! `generateContent` route from the same listener, counting requests and
//! recording the last body each one received.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Default reply text
pub const MOCK_REPLY: &str = "Hello from mock LLM";

/// Mock upstream that returns predictable responses
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    completion_count: AtomicU32,
    generate_count: AtomicU32,
    /// Number of requests to fail before succeeding
    fail_count: AtomicU32,
    /// Status returned while failing
    fail_status: AtomicU16,
    response_content: String,
    last_body: Mutex<Option<Value>>,
    last_headers: Mutex<Option<HeaderMap>>,
}

impl MockLlm {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, StatusCode::INTERNAL_SERVER_ERROR, MOCK_REPLY).await
    }

    /// Start a mock server that fails the first `n` requests with `status`
    pub async fn start_failing(n: u32, status: StatusCode) -> anyhow::Result<Self> {
        Self::start_inner(n, status, MOCK_REPLY).await
    }

    /// Start a mock server with a custom reply text
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_inner(0, StatusCode::INTERNAL_SERVER_ERROR, content).await
    }

    async fn start_inner(fail_count: u32, fail_status: StatusCode, content: &str) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            completion_count: AtomicU32::new(0),
            generate_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            fail_status: AtomicU16::new(fail_status.as_u16()),
            response_content: content.to_owned(),
            last_body: Mutex::new(None),
            last_headers: Mutex::new(None),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1beta/models/{action}", routing::post(handle_generate_content))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for the OpenAI-compatible sources
    ///
    /// Includes `/v1` since the adapter appends `/chat/completions`
    pub fn openai_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for the Gemini source
    pub fn gemini_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Number of chat completion requests received
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Number of `generateContent` requests received
    pub fn generate_count(&self) -> u32 {
        self.state.generate_count.load(Ordering::Relaxed)
    }

    /// Body of the most recent request
    pub fn last_body(&self) -> Value {
        self.state
            .last_body
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Value::Null)
    }

    /// Headers of the most recent request
    pub fn last_headers(&self) -> HeaderMap {
        self.state.last_headers.lock().unwrap().clone().unwrap_or_default()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockLlmState {
    fn record(&self, headers: HeaderMap, body: Value) {
        *self.last_body.lock().unwrap() = Some(body);
        *self.last_headers.lock().unwrap() = Some(headers);
    }

    /// Consume one scripted failure, if any remain
    fn take_failure(&self) -> Option<StatusCode> {
        self.fail_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .ok()
            .map(|_| StatusCode::from_u16(self.fail_status.load(Ordering::Relaxed)).unwrap())
    }
}

fn failure_body(status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(json!({
            "error": {
                "message": "mock server intentional failure",
                "type": "server_error"
            }
        })),
    )
}

// -- Handlers --

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    let model = body["model"].as_str().unwrap_or("mock-model").to_owned();
    state.record(headers, body);

    if let Some(status) = state.take_failure() {
        return failure_body(status).into_response();
    }

    Json(json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.response_content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

async fn handle_generate_content(
    State(state): State<Arc<MockLlmState>>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.generate_count.fetch_add(1, Ordering::Relaxed);
    state.record(headers, body);

    if !action.ends_with(":generateContent") {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Some(status) = state.take_failure() {
        return failure_body(status).into_response();
    }

    Json(json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"text": "thinking out loud", "thought": true},
                    {"text": state.response_content}
                ]
            },
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
    }))
    .into_response()
}
