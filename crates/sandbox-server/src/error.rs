//! Error types for the sandbox HTTP server.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use sandbox_core::{ExecutionReport, ExecutionResult, SandboxError};
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur while serving sandbox requests.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Error raised by the executor
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Body could not be read or is not the expected JSON
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Sandbox(e) => e.status_code(),
            ServerError::InvalidBody(rejection) => match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => 413,
                _ => 400,
            },
            ServerError::Io(_) | ServerError::Config(_) | ServerError::Internal(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Sandbox(e) => e.error_type(),
            ServerError::InvalidBody(_) => "invalid_request",
            ServerError::Io(_) => "io_error",
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }

    /// Short, client-facing summary; the full message goes into `details`.
    fn summary(&self) -> String {
        match self {
            ServerError::Sandbox(SandboxError::InputValidation(msg)) => msg.clone(),
            ServerError::Sandbox(SandboxError::Saturated { .. }) => self.to_string(),
            ServerError::Sandbox(SandboxError::LaunchFailure { .. }) => {
                "Sandbox container could not be started.".to_string()
            }
            ServerError::InvalidBody(_) => "Request body is not valid JSON.".to_string(),
            _ => "Internal server error during execution.".to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self {
            // Launch failures still carry a complete result so clients can show the diagnostic.
            ServerError::Sandbox(e @ SandboxError::LaunchFailure { .. }) => {
                log::error!("Execution could not start: {}", e);
                let report = ExecutionReport::new(ExecutionResult::not_started(e.to_string()), false);
                let mut body = serde_json::to_value(report).unwrap_or_else(|_| json!({}));
                body["error"] = json!(self.summary());
                body["errorType"] = json!(self.error_type());
                body["timestamp"] = json!(chrono::Utc::now());
                body
            }
            ServerError::Sandbox(SandboxError::Saturated { .. }) => {
                log::warn!("{}", self);
                json!({
                    "error": self.summary(),
                    "errorType": self.error_type(),
                    "timestamp": chrono::Utc::now()
                })
            }
            _ => {
                if status.is_server_error() {
                    log::error!("/execute error: {}", self);
                } else {
                    log::info!("Rejected request: {}", self);
                }
                json!({
                    "error": self.summary(),
                    "details": self.to_string(),
                    "errorType": self.error_type(),
                    "timestamp": chrono::Utc::now()
                })
            }
        };

        (status, Json(body)).into_response()
    }
}
