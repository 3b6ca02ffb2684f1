use http::StatusCode;
use serde::Serialize;

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by each feature crate's error type. The server layer
/// converts these into actual HTTP responses, keeping domain errors
/// decoupled from axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `validation_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;

    /// Structured body describing this error
    fn error_body(&self) -> ErrorBody {
        ErrorBody {
            message: self.client_message(),
            r#type: self.error_type().to_owned(),
            code: self.status_code().as_u16(),
        }
    }
}

/// `{"error": {...}}` wrapper returned for failed requests
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl<E: HttpError> From<&E> for ErrorEnvelope {
    fn from(error: &E) -> Self {
        Self {
            error: error.error_body(),
        }
    }
}

/// Error details, also embedded in per-task results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub r#type: String,
    pub code: u16,
}
