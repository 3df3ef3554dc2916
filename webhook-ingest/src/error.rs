//! Error types.
//!
//! Every [`IngestError`] maps to exactly one HTTP status; none of them are
//! fatal to the process.

use axum::http::StatusCode;
use thiserror::Error;

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Why a single webhook delivery was not accepted.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Secret header missing or not matching.
    #[error("authentication failed: {0}")]
    Authentication(&'static str),

    /// Body is empty, malformed or not a key-value document.
    #[error("invalid payload: {0}")]
    Validation(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    /// The sink refused the event; resending the same payload will not help.
    #[error("event rejected by sink: {0}")]
    SinkRejection(String),

    /// The sink or delivery store timed out or could not be reached.
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Authentication(_) => StatusCode::UNAUTHORIZED,
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            IngestError::SinkRejection(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::SinkUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether the sender should redeliver the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::SinkUnavailable(_))
    }
}
