use std::time::Duration;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use resonance_core::{ErrorEnvelope, HttpError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredictError>;

/// Errors that fail a whole request
#[derive(Debug, Error)]
pub enum PredictError {
    /// Request body has the wrong shape
    #[error("{0}")]
    InvalidBody(String),

    /// A single-item request failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Audio for a single-segment request could not be fetched
    #[error(transparent)]
    AudioFetch(#[from] AudioFetchError),

    /// The model endpoint could not be reached on any attempt
    #[error("model endpoint unreachable: {0}")]
    UpstreamUnreachable(ModelError),

    /// The batch did not finish in time
    #[error("prediction did not finish within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl HttpError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation(e) => e.status_code(),
            Self::AudioFetch(_) | Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidBody(_) => "validation_error",
            Self::Validation(e) => e.error_type(),
            Self::AudioFetch(e) => e.error_type(),
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::Timeout(_) => "timeout_error",
        }
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (status, Json(ErrorEnvelope::from(&self))).into_response()
    }
}

/// Which task a validation problem belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRef {
    Id(i64),
    Position(usize),
}

impl std::fmt::Display for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "task {id}"),
            Self::Position(index) => write!(f, "task at position {index}"),
        }
    }
}

/// A task payload is missing fields or has the wrong types
#[derive(Debug, Clone, Error)]
#[error("{task}: {}", problems.join(", "))]
pub struct ValidationError {
    pub task: TaskRef,
    pub problems: Vec<String>,
}

impl HttpError for ValidationError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNPROCESSABLE_ENTITY
    }

    fn error_type(&self) -> &str {
        "validation_error"
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}

/// An audio reference could not be turned into a local file
#[derive(Debug, Error)]
#[error("failed to fetch audio '{reference}': {cause}")]
pub struct AudioFetchError {
    pub reference: String,
    pub cause: FetchCause,
}

impl AudioFetchError {
    pub(crate) fn new(reference: &str, cause: FetchCause) -> Self {
        Self {
            reference: reference.to_owned(),
            cause,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchCause {
    #[error("browser-local blob references cannot be fetched by the server")]
    BlobReference,
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("server returned {0}")]
    Status(u16),
    #[error("download timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("file exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError for AudioFetchError {
    fn status_code(&self) -> StatusCode {
        match self.cause {
            FetchCause::BlobReference | FetchCause::InvalidReference(_) => StatusCode::BAD_REQUEST,
            FetchCause::NotFound(_) | FetchCause::Status(404) => StatusCode::NOT_FOUND,
            FetchCause::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FetchCause::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FetchCause::Status(_) | FetchCause::Connection(_) => StatusCode::BAD_GATEWAY,
            FetchCause::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        "audio_fetch_error"
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}

/// A single model call failed
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// No connection could be established (refused, DNS)
    #[error("connection failed: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited")]
    RateLimited,
    #[error("provider returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Rejected as invalid, typically unreadable audio
    #[error("request rejected: {0}")]
    InvalidRequest(String),
    #[error("content blocked: {0}")]
    Blocked(String),
    #[error("model returned no content")]
    EmptyCandidate,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ModelError {
    /// Whether another attempt may succeed
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout | Self::Network(_) | Self::RateLimited | Self::Server { .. }
        )
    }

    /// Whether the endpoint was never reached
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    /// Short label used in logs and metrics
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::Timeout => "timeout",
            Self::Network(_) => "network",
            Self::RateLimited => "rate_limited",
            Self::Server { .. } => "server_error",
            Self::Authentication(_) => "authentication",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Blocked(_) => "blocked",
            Self::EmptyCandidate => "empty_candidate",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Model output could not be turned into JSON
#[derive(Debug, Clone, Error)]
#[error("unparsable model output: {0}")]
pub struct NormalizationError(pub String);
