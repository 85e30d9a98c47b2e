//! Error types for the relay and the upload client.
//!
//! [`RelayError`] implements [`axum::response::IntoResponse`] so handler
//! failures always render the `{success: false, error}` envelope with the
//! matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::api::models::ApiResponse;
use crate::client::queue::ItemId;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors raised while handling a relay request
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    /// The caller sent incomplete or invalid input
    #[error("{0}")]
    Validation(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The provider answered with a non-2xx status
    #[error("TinyPNG API error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// A percentage resize needs the original size, which the provider did not report
    #[error("TinyPNG did not report the original image dimensions")]
    MissingDimensions,

    #[error("Provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::Provider { .. }
            | RelayError::MissingDimensions
            | RelayError::Transport(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            RelayError::Internal(detail) => {
                error!(message = %detail, "internal relay error");
                "Unknown error occurred".to_string()
            }
            other => {
                if status.is_server_error() {
                    error!(error = %other, "image processing failed");
                }
                other.to_string()
            }
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

/// Errors raised by the upload client
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Please enter and save your TinyPNG API key first")]
    MissingApiKey,

    #[error("Please select image files only")]
    NoImageFiles,

    #[error("Please enter a valid API key")]
    InvalidApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error! status: {status}{}", status_detail(.message))]
    Status { status: u16, message: Option<String> },

    #[error("Malformed relay response: {0}")]
    Malformed(String),

    /// The relay answered with `success: false`
    #[error("{0}")]
    Rejected(String),

    #[error("Result size mismatch: expected {expected} bytes, decoded {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

fn status_detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" ({m})"))
        .unwrap_or_default()
}

/// Invalid transitions on the upload queue
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("unknown upload item {0}")]
    UnknownItem(ItemId),

    #[error("upload item {0} already finished")]
    InvalidTransition(ItemId),
}
