use resonance_config::{AudioFormat, Capability};
use resonance_core::ErrorBody;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /predict` body
///
/// Tasks stay untyped until validation so that one malformed task cannot
/// reject the whole batch.
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub tasks: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub results: Vec<PredictionResult>,
}

/// Prediction for one task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub result: Vec<ResultEntry>,
    pub score: f64,
    pub model_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// One platform result entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    /// Region id, shared by entries describing the same segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from_name: String,
    pub to_name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub value: EntryValue,
    pub origin: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Labels,
    Choices,
    Textarea,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
}

/// `POST /setup` reply
#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub model_version: String,
    pub status: &'static str,
    pub capabilities: Vec<Capability>,
    pub supported_formats: Vec<AudioFormat>,
}

/// `POST /train` reply
#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub status: &'static str,
}

/// `GET /` reply
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub model_class: &'static str,
    pub status: &'static str,
    pub version: &'static str,
    pub model_version: String,
    pub capabilities: Vec<Capability>,
}

/// `POST /transcribe-segment` body
#[derive(Debug, Deserialize)]
pub struct SegmentRequest {
    pub audio_url: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub task_id: Option<i64>,
    #[serde(default)]
    pub project_id: Option<i64>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct SegmentResponse {
    pub transcription: String,
    pub language: String,
    pub gender: String,
    pub emotion: String,
    pub confidence: f64,
}
