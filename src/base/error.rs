//! Request-level errors and their HTTP classification.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every way a parse request can fail, as seen by the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The `Authorization` or `apikey` header is absent.
    #[error("Missing authorization")]
    MissingAuthorization,

    /// The backend rejected the caller's access token.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The body is not a JSON object of the expected shape.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// A required request field is absent or empty.
    #[error("Missing required fields")]
    MissingFields,

    /// The review has no stored sections for the page.
    #[error("Page {0} not found")]
    PageNotFound(u32),

    /// Anything else: downloads, extraction, persistence.
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingAuthorization | ApiError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            ApiError::InvalidBody(_) | ApiError::MissingFields => StatusCode::BAD_REQUEST,
            ApiError::PageNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        error!("Error {}: {}", status.as_u16(), message);

        (status, Json(json!({ "error": message }))).into_response()
    }
}

// Tests.
