//! Audio prediction pipeline for annotation tasks
//!
//! Each task goes through validation, audio resolution, one model call per
//! requested capability (with retry), reply normalization and result
//! assembly. Downloaded audio is removed when the task ends.

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod assemble;
mod audio;
mod capability;
mod error;
mod http_client;
mod invoker;
mod labels;
mod normalize;
mod platform;
mod protocol;
mod provider;
mod server;
mod types;
mod validate;

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};

pub use error::{AudioFetchError, FetchCause, ModelError, PredictError, Result, TaskRef, ValidationError};
pub use server::Predictor;
pub use types::{
    EntryKind, EntryValue, InfoResponse, PredictRequest, PredictResponse, PredictionResult, ResultEntry,
    SegmentRequest, SegmentResponse, SetupResponse, TrainResponse,
};
use server::PredictorBuilder;

/// Build the predictor from configuration
///
/// # Errors
///
/// Returns an error if the model provider cannot be initialized
pub fn build_server(config: &resonance_config::Config) -> anyhow::Result<Arc<Predictor>> {
    let predictor = Arc::new(
        PredictorBuilder::new(config)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to initialize predictor: {e}"))?,
    );
    Ok(predictor)
}

/// Create the endpoint router for the ML backend protocol
pub fn endpoint_router() -> Router<Arc<Predictor>> {
    Router::new()
        .route("/", get(info))
        .route("/predict", post(predict))
        .route("/setup", post(setup))
        .route("/train", post(train))
        .route("/transcribe-segment", post(transcribe_segment))
}

async fn info(State(predictor): State<Arc<Predictor>>) -> Json<InfoResponse> {
    Json(predictor.info())
}

async fn predict(
    State(predictor): State<Arc<Predictor>>,
    payload: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>> {
    let Json(request) = payload.map_err(|e| PredictError::InvalidBody(e.body_text()))?;

    let response = predictor.predict(request).await?;

    Ok(Json(response))
}

/// Accepts any body; the backend keeps no per-project state
async fn setup(State(predictor): State<Arc<Predictor>>, _body: Bytes) -> Json<SetupResponse> {
    tracing::debug!("setup requested");
    Json(predictor.setup())
}

/// Training is not offered; the body is ignored
async fn train(_body: Bytes) -> Json<TrainResponse> {
    tracing::debug!("training requested");
    Json(TrainResponse {
        status: "Training not supported",
    })
}

async fn transcribe_segment(
    State(predictor): State<Arc<Predictor>>,
    payload: std::result::Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<Json<SegmentResponse>> {
    let Json(request) = payload.map_err(|e| PredictError::InvalidBody(e.body_text()))?;

    tracing::debug!(
        audio = %request.audio_url,
        start = request.start_time,
        end = request.end_time,
        "segment transcription requested"
    );

    let response = predictor.transcribe_segment(request).await?;

    Ok(Json(response))
}
