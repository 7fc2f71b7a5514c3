//! services/api/src/error.rs
//!
//! Defines the startup error type for the API service and the mapping from
//! core errors to HTTP responses used by every handler.

use crate::config::ConfigError;
use axum::http::StatusCode;
use rapid_review_core::{CoreError, PortError};
use tracing::{error, warn};

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the schema migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents an error related to the WebSocket connection.
    #[error("WebSocket Error: {0}")]
    Websocket(#[from] axum::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The error half of every handler's return type.
pub type HandlerError = (StatusCode, String);

/// Maps a core error onto a status code and a client-safe message.
///
/// Validation, permission and lookup failures carry their own message;
/// anything unexpected is logged in full and reported as "Failed to {action}".
pub fn core_error_response(action: &str, err: CoreError) -> HandlerError {
    match err {
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        CoreError::Forbidden(msg) => {
            warn!("Refused to {}: {}", action, msg);
            (StatusCode::FORBIDDEN, msg)
        }
        CoreError::Port(e) => port_error_response(action, e),
    }
}

pub fn port_error_response(action: &str, err: PortError) -> HandlerError {
    match err {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::Unexpected(msg) => {
            error!("Failed to {}: {}", action, msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {}", action),
            )
        }
    }
}
