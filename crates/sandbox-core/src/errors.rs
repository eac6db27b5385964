//! Error types for the sandbox executor
//!
//! Only conditions that stop the executor from producing a structured result
//! are errors. A program that times out, exits non-zero or writes to stderr
//! is an ordinary outcome and is reported through `ExecutionResult`.

use thiserror::Error;

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[derive(Error, Debug)]
pub enum SandboxError {
    /// The request itself is unusable (no files, unknown entry point, bad filename).
    #[error("Invalid execution request: {0}")]
    InputValidation(String),

    /// Staging files into the workspace failed. The workspace has already been removed.
    #[error("System error preparing sandbox files: {0}")]
    WorkspacePreparation(String),

    /// The isolated process never started.
    #[error("Failed to launch sandbox container: {reason}\n{remediation}")]
    LaunchFailure { reason: String, remediation: String },

    /// No execution slot became free within the queue timeout.
    #[error("Sandbox is at capacity ({max_concurrent} concurrent executions); try again later")]
    Saturated { max_concurrent: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bollard (Docker client) error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The detached execution task ended without producing an outcome.
    #[error("Execution task failed: {0}")]
    Internal(String),
}

impl SandboxError {
    pub fn input_validation(msg: impl Into<String>) -> Self {
        Self::InputValidation(msg.into())
    }

    pub fn workspace_preparation(msg: impl Into<String>) -> Self {
        Self::WorkspacePreparation(msg.into())
    }

    /// Build a launch failure carrying the standard remediation hint for `image`.
    pub fn launch_failure(reason: impl Into<String>, image: &str) -> Self {
        Self::LaunchFailure {
            reason: reason.into(),
            remediation: format!(
                "Make sure Docker is running and the \"{}\" image is built.",
                image
            ),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status code the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            SandboxError::InputValidation(_) => 400,
            SandboxError::LaunchFailure { .. } | SandboxError::Saturated { .. } => 503,
            SandboxError::WorkspacePreparation(_)
            | SandboxError::Config(_)
            | SandboxError::Docker(_)
            | SandboxError::Io(_)
            | SandboxError::Internal(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            SandboxError::InputValidation(_) => "input_validation",
            SandboxError::WorkspacePreparation(_) => "workspace_preparation",
            SandboxError::LaunchFailure { .. } => "launch_failure",
            SandboxError::Saturated { .. } => "saturated",
            SandboxError::Config(_) => "config_error",
            SandboxError::Docker(_) => "docker_error",
            SandboxError::Io(_) => "io_error",
            SandboxError::Internal(_) => "internal_error",
        }
    }

    /// True for errors raised before any workspace or container existed.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SandboxError::InputValidation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_failure_carries_remediation() {
        let err = SandboxError::launch_failure("connection refused", "sandbox-runner");
        let text = err.to_string();
        assert!(text.contains("connection refused"));
        assert!(text.contains("Make sure Docker is running and the \"sandbox-runner\" image is built."));
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.error_type(), "launch_failure");
    }

    #[test]
    fn only_input_validation_is_a_client_error() {
        assert!(SandboxError::input_validation("no files").is_client_error());
        assert_eq!(SandboxError::input_validation("no files").status_code(), 400);
        assert!(!SandboxError::workspace_preparation("disk full").is_client_error());
        assert_eq!(SandboxError::workspace_preparation("disk full").status_code(), 500);
        assert_eq!(SandboxError::Saturated { max_concurrent: 2 }.status_code(), 503);
    }
}
