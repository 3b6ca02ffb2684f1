//! Mock annotation platform serving task audio

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// A few bytes that sniff as MP3
pub const MP3_BYTES: &[u8] = b"ID3\x04\0\0\0\0\0\0fake-audio";

/// Access token handed out by the refresh endpoint
pub const FRESH_ACCESS: &str = "fresh-access";

/// How long `/slow.mp3` stalls after its first chunk
const STALL: Duration = Duration::from_secs(30);

pub struct MockPlatform {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockPlatformState>,
}

#[derive(Default)]
struct MockPlatformState {
    downloads: AtomicU32,
    refreshes: AtomicU32,
    last_authorization: Mutex<Option<String>>,
}

impl MockPlatform {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockPlatformState::default());

        let app = Router::new()
            .route("/test.mp3", routing::get(serve_mp3))
            .route("/data/upload/1/test.mp3", routing::get(serve_mp3))
            .route("/clip.txt", routing::get(serve_text))
            .route("/empty.mp3", routing::get(serve_empty))
            .route("/slow.mp3", routing::get(serve_slow))
            .route("/api/token/refresh/", routing::post(refresh))
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

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Audio and text downloads served, failed lookups excluded
    pub fn downloads(&self) -> u32 {
        self.state.downloads.load(Ordering::Relaxed)
    }

    pub fn refreshes(&self) -> u32 {
        self.state.refreshes.load(Ordering::Relaxed)
    }

    /// `Authorization` header of the most recent download
    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().unwrap().clone()
    }
}

impl Drop for MockPlatform {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn record(state: &MockPlatformState, headers: &HeaderMap) {
    state.downloads.fetch_add(1, Ordering::Relaxed);
    *state.last_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
}

async fn serve_mp3(State(state): State<Arc<MockPlatformState>>, headers: HeaderMap) -> impl IntoResponse {
    record(&state, &headers);
    ([(header::CONTENT_TYPE, "audio/mpeg")], MP3_BYTES)
}

async fn serve_text(State(state): State<Arc<MockPlatformState>>, headers: HeaderMap) -> impl IntoResponse {
    record(&state, &headers);
    ([(header::CONTENT_TYPE, "text/plain")], "not audio at all")
}

async fn serve_empty(State(state): State<Arc<MockPlatformState>>, headers: HeaderMap) -> impl IntoResponse {
    record(&state, &headers);
    ([(header::CONTENT_TYPE, "audio/mpeg")], "")
}

/// Sends one chunk of audio, then stalls before ending the body
async fn serve_slow(State(state): State<Arc<MockPlatformState>>, headers: HeaderMap) -> impl IntoResponse {
    record(&state, &headers);

    let chunks = futures::stream::unfold(true, |first| async move {
        if first {
            Some((Ok::<_, std::io::Error>(Bytes::from_static(MP3_BYTES)), false))
        } else {
            tokio::time::sleep(STALL).await;
            None
        }
    });

    ([(header::CONTENT_TYPE, "audio/mpeg")], Body::from_stream(chunks))
}

async fn refresh(State(state): State<Arc<MockPlatformState>>) -> impl IntoResponse {
    state.refreshes.fetch_add(1, Ordering::Relaxed);
    (StatusCode::OK, Json(json!({ "access": FRESH_ACCESS })))
}
