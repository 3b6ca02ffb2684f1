//! Mock Gemini backend for integration tests
//!
//! Answers `generateContent` with canned replies chosen by the kind of
//! instruction it receives.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Reply to the transcript instruction: fenced, out of order, with string timestamps
pub const TRANSCRIPT_REPLY: &str = r#"```json
{"segments": [
  {"start": "00:04.2", "end": 7.0, "speaker": "spk_b", "text": "Ikkinchi gap", "language": "Uzbek", "gender": "Male", "emotion": "calm", "confidence": 0.8},
  {"start": 0, "end": 4.2, "speaker": "spk_a", "text": "Birinchi gap", "confidence": 0.9},
]}
```"#;

const LANGUAGE_REPLY: &str = r#"{"language": "uz", "confidence": 0.93}"#;
const EMOTION_REPLY: &str = r#"{"emotion": "neutral"}"#;
const GENDER_REPLY: &str = r#"{"gender": "female"}"#;
const SUMMARY_REPLY: &str = r#"Sure! {"summary": "Two speakers exchange greetings."}"#;
const ENTITIES_REPLY: &str = r#"{"entities": [{"text": "Toshkent", "label": "LOCATION"}]}"#;

/// Mock model backend with per-instruction replies
pub struct MockModel {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockModelState>,
}

struct MockModelState {
    request_count: AtomicU32,
    /// Number of requests to fail with 503 before succeeding (0 = never fail)
    fail_count: AtomicU32,
    /// Answer every request with a safety block
    blocked: AtomicBool,
    replies: Mutex<HashMap<&'static str, String>>,
    calls: Mutex<HashMap<&'static str, u32>>,
    mime_types: Mutex<Vec<String>>,
}

impl MockModel {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, false).await
    }

    /// Start a mock server that fails the first `n` requests with 503
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(n, false).await
    }

    /// Start a mock server that blocks every request for safety
    pub async fn start_blocked() -> anyhow::Result<Self> {
        Self::start_inner(0, true).await
    }

    async fn start_inner(fail_count: u32, blocked: bool) -> anyhow::Result<Self> {
        let replies = HashMap::from([
            ("transcript", TRANSCRIPT_REPLY.to_owned()),
            ("language", LANGUAGE_REPLY.to_owned()),
            ("emotion", EMOTION_REPLY.to_owned()),
            ("gender", GENDER_REPLY.to_owned()),
            ("summary", SUMMARY_REPLY.to_owned()),
            ("entities", ENTITIES_REPLY.to_owned()),
        ]);

        let state = Arc::new(MockModelState {
            request_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            blocked: AtomicBool::new(blocked),
            replies: Mutex::new(replies),
            calls: Mutex::new(HashMap::new()),
            mime_types: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1beta/models/{*rest}", routing::post(handle_generate))
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

    /// Base URL for configuring the mock as the model endpoint
    pub fn base_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Replace the reply for one instruction kind (`transcript`, `language`, ...)
    pub fn set_reply(&self, kind: &'static str, reply: &str) {
        self.state.replies.lock().unwrap().insert(kind, reply.to_owned());
    }

    /// Total `generateContent` requests received
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Requests received for one instruction kind
    pub fn calls(&self, kind: &str) -> u32 {
        self.state.calls.lock().unwrap().get(kind).copied().unwrap_or(0)
    }

    /// MIME types of the inline audio received, in order
    pub fn mime_types(&self) -> Vec<String> {
        self.state.mime_types.lock().unwrap().clone()
    }
}

impl Drop for MockModel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Base URL of a port nothing listens on
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1beta")
}

fn instruction_kind(instruction: &str) -> &'static str {
    if instruction.contains("Transcribe this audio") || instruction.contains("Find the speaker turns") {
        "transcript"
    } else if instruction.contains("primary spoken language") {
        "language"
    } else if instruction.contains("dominant emotion") {
        "emotion"
    } else if instruction.contains("gender of the main speaker") {
        "gender"
    } else if instruction.contains("Summarize the recording") {
        "summary"
    } else if instruction.contains("named entities") {
        "entities"
    } else {
        "unknown"
    }
}

async fn handle_generate(
    State(state): State<Arc<MockModelState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"code": 401, "message": "API key not valid", "status": "UNAUTHENTICATED"}})),
        );
    }

    if state
        .fail_count
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"code": 503, "message": "The model is overloaded", "status": "UNAVAILABLE"}})),
        );
    }

    let parts = &body["contents"][0]["parts"];
    let instruction = parts[0]["text"].as_str().unwrap_or_default();
    let kind = instruction_kind(instruction);

    *state.calls.lock().unwrap().entry(kind).or_insert(0) += 1;

    if let Some(mime) = parts[1]["inlineData"]["mimeType"].as_str() {
        state.mime_types.lock().unwrap().push(mime.to_owned());
    }

    if state.blocked.load(Ordering::Relaxed) {
        return (
            StatusCode::OK,
            Json(json!({"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}})),
        );
    }

    let reply = state.replies.lock().unwrap().get(kind).cloned().unwrap_or_default();

    (
        StatusCode::OK,
        Json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": reply}]},
                "finishReason": "STOP"
            }],
            "modelVersion": "gemini-2.0-flash"
        })),
    )
}
