use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::Error;

/// Boundary error wrapper: maps typed core failures to HTTP statuses and
/// anything unexpected to a 500, with a `{"error": …}` body either way.
#[derive(Debug)]
pub enum AppError {
    Domain(Error),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Domain(Error::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            AppError::Domain(Error::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            AppError::Domain(Error::Conflict(msg)) => (StatusCode::CONFLICT, msg),
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Unhandled internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self::Domain(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}
