//! Error types for the unlock backend
//!
//! This module provides error handling for the crate, including:
//! - Domain-specific error variants with context
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//!
//! Asynchronous execution failures (wrong password, missing tool, nonzero
//! exit) are deliberately *not* represented here: they are captured into the
//! owning job's terminal state and surfaced on the next poll. `Error` covers
//! only failures that propagate through a `Result`.

use crate::types::JobId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for unlock backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the unlock backend
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "unlock.rate_window")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job not found in the store
    #[error("unlock job {0} not found")]
    JobNotFound(JobId),

    /// External decrypt process could not be launched
    #[error("failed to spawn unlock process: {0}")]
    SpawnFailed(String),

    /// The qpdf binary is not installed on this host
    #[error("external tool missing: {0}")]
    ToolMissing(String),

    /// API server error
    #[error("API server error: {0}")]
    ApiServer(String),
}

/// API error response format
///
/// Returned by API endpoints when an error occurs. Machine-readable error
/// code plus a human-readable message, with optional contextual details.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "Unlock job not found."
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message, suitable for displaying to end users
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found.", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create a "forbidden" error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    /// Create a "too many requests" error
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new("too_many_requests", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    /// Create a "gone" error
    pub fn gone(message: impl Into<String>) -> Self {
        Self::new("gone", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - invalid input
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::JobNotFound(_) => 404,

            // 503 Service Unavailable - environmental, not a crash
            Error::ToolMissing(_) => 503,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::SpawnFailed(_) => 500,
            Error::ApiServer(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::JobNotFound(_) => "job_not_found",
            Error::SpawnFailed(_) => "spawn_error",
            Error::ToolMissing(_) => "qpdf_missing",
            Error::ApiServer(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::JobNotFound(id) => Some(serde_json::json!({ "job_id": id.to_string() })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            _ => None,
        };

        match details {
            Some(details) => ApiError::with_details(code, message, details),
            None => ApiError::new(code, message),
        }
    }
}
