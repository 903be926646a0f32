// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Admin code required")]
    Unauthorized,

    #[error("Invalid admin code")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a backend failure looks credential-related (unauthenticated,
    /// permission denied, missing service-account key). These are the only
    /// failure classes that trigger the primary-to-secondary fallback.
    pub fn is_credential_error(&self) -> bool {
        match self {
            AppError::Database(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("unauthenticated")
                    || msg.contains("permission")
                    || msg.contains("credential")
                    || msg.contains("account key")
            }
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Routing(msg) => (StatusCode::BAD_GATEWAY, "routing_error", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_error_classification() {
        let err = AppError::Database("status: PermissionDenied, message: ...".to_string());
        assert!(err.is_credential_error());

        let err = AppError::Database("UNAUTHENTICATED: missing bearer token".to_string());
        assert!(err.is_credential_error());

        let err = AppError::Database("deadline exceeded".to_string());
        assert!(!err.is_credential_error());

        let err = AppError::NotFound("position 7".to_string());
        assert!(!err.is_credential_error());
    }
}
