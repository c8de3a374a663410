//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use neurostudy_core::ports::PortError;
use serde::Serialize;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("{0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while applying the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a malformed client request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Port(port) => match port {
                PortError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                PortError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
                PortError::Configuration(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_configured"),
                PortError::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
                PortError::InvalidResponse(_) => (StatusCode::BAD_GATEWAY, "invalid_response"),
                PortError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
                PortError::Unexpected(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            ApiError::Database(_) | ApiError::Migration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
            ApiError::Io(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        // The provider's message is passed through as-is for the client to show.
        let body = Json(ErrorResponse {
            error: kind,
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
