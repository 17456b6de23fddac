//! Errors returned by the webhook endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Reasons a webhook call is rejected.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The shared-secret header was missing or wrong.
    #[error("missing or invalid shared secret")]
    Unauthorized,

    /// The body was not valid JSON.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl WebhookError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        // Bodies stay generic so nothing about the secret or parser leaks.
        let body = match &self {
            Self::Unauthorized => "Unauthorized",
            Self::InvalidPayload(_) => "Invalid payload",
        };
        (self.status_code(), body).into_response()
    }
}
