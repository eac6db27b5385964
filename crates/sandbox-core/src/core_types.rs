//! Request and result types shared by the executor and its callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::SandboxError;

/// Files to stage plus the one to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Relative filename (may contain `/`-separated directories) to UTF-8 content.
    pub files: BTreeMap<String, String>,
    pub entry_point: String,
    /// Scoring predicate source, evaluated against the entry point's content.
    #[serde(default)]
    pub test_check: Option<String>,
}

impl ExecutionRequest {
    pub fn new(files: BTreeMap<String, String>, entry_point: impl Into<String>) -> Self {
        Self {
            files,
            entry_point: entry_point.into(),
            test_check: None,
        }
    }

    /// Convenience for the common single-file submission.
    pub fn single(filename: impl Into<String>, content: impl Into<String>) -> Self {
        let filename = filename.into();
        let mut files = BTreeMap::new();
        files.insert(filename.clone(), content.into());
        Self::new(files, filename)
    }

    pub fn with_test_check(mut self, test_check: impl Into<String>) -> Self {
        self.test_check = Some(test_check.into());
        self
    }

    /// Structural checks that need no filesystem access. Filename safety is
    /// enforced separately by the workspace before anything is written.
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.files.is_empty() {
            return Err(SandboxError::input_validation("No code or files provided."));
        }
        if self.entry_point.trim().is_empty() {
            return Err(SandboxError::input_validation("Entry point cannot be empty."));
        }
        if !self.files.contains_key(&self.entry_point) {
            return Err(SandboxError::input_validation(format!(
                "Entry point '{}' is not one of the submitted files.",
                self.entry_point
            )));
        }
        Ok(())
    }

    /// Source text of the entry point, the input of the verdict predicate.
    pub fn entry_source(&self) -> &str {
        self.files
            .get(&self.entry_point)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Which standard stream a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One piece of output, in the order the container produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub data: Vec<u8>,
}

impl OutputChunk {
    pub fn stdout(data: impl Into<Vec<u8>>) -> Self {
        Self { stream: StreamKind::Stdout, data: data.into() }
    }

    pub fn stderr(data: impl Into<Vec<u8>>) -> Self {
        Self { stream: StreamKind::Stderr, data: data.into() }
    }
}

/// Normalized outcome of one run. `exit_code` is meaningless when `timed_out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Shape reported when the isolated process never started.
    pub fn not_started(diagnostic: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: diagnostic.into(),
            exit_code: 1,
            timed_out: false,
        }
    }
}

/// Wire result: the execution outcome plus the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub timed_out: bool,
    pub passed: bool,
}

impl ExecutionReport {
    pub fn new(result: ExecutionResult, passed: bool) -> Self {
        Self {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            timed_out: result.timed_out,
            passed,
        }
    }
}
