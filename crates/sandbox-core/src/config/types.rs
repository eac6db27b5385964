//! Configuration type definitions for the sandbox executor
//!
//! Every section is optional in YAML. An empty document yields the reference
//! profile: 10 s wall clock, 64 MiB memory with swap capped equal, half a CPU
//! core, 8 MiB scratch, 8192/4096 byte output caps.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::errors::SandboxError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub server: HttpConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which image runs the code and how the entry point is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_image")]
    pub image: String,
    /// Command prefix; the entry point path inside the container is appended.
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    /// Identity inside the container. `None` keeps the image's `USER`.
    #[serde(default = "default_user")]
    pub user: Option<String>,
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
    #[serde(default = "default_entry_point")]
    pub default_entry_point: String,
    /// Engine endpoint; local defaults (socket or `DOCKER_HOST`) when unset.
    #[serde(default)]
    pub docker_host: Option<String>,
}

/// Per-execution resource ceilings. Fixed per deployment, never per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: i64,
    #[serde(default = "default_cpus")]
    pub cpus: f64,
    #[serde(default = "default_scratch_bytes")]
    pub scratch_bytes: u64,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,
    #[serde(default = "default_stdout_cap")]
    pub stdout_cap: usize,
    #[serde(default = "default_stderr_cap")]
    pub stderr_cap: usize,
    /// How long buffered output is still drained after a forced kill.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent directory for per-request workspaces; the system temp dir when unset.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_image() -> String { "sandbox-runner".to_string() }
fn default_command() -> Vec<String> { vec!["node".to_string()] }
fn default_user() -> Option<String> { Some("runner".to_string()) }
fn default_mount_path() -> String { "/sandbox".to_string() }
fn default_entry_point() -> String { "index.js".to_string() }
fn default_timeout_secs() -> u64 { 10 }
fn default_memory_bytes() -> i64 { 64 * 1024 * 1024 }
fn default_cpus() -> f64 { 0.5 }
fn default_scratch_bytes() -> u64 { 8 * 1024 * 1024 }
fn default_pids_limit() -> i64 { 64 }
fn default_stdout_cap() -> usize { 8192 }
fn default_stderr_cap() -> usize { 4096 }
fn default_kill_grace_ms() -> u64 { 500 }
fn default_max_concurrent() -> usize { 4 }
fn default_queue_timeout_secs() -> u64 { 30 }
fn default_bind_addr() -> String { "127.0.0.1:3001".to_string() }
fn default_max_body_size() -> usize { 256 * 1024 }
fn default_log_level() -> String { "info".to_string() }

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            command: default_command(),
            user: default_user(),
            mount_path: default_mount_path(),
            default_entry_point: default_entry_point(),
            docker_host: None,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            memory_bytes: default_memory_bytes(),
            cpus: default_cpus(),
            scratch_bytes: default_scratch_bytes(),
            pids_limit: default_pids_limit(),
            stdout_cap: default_stdout_cap(),
            stderr_cap: default_stderr_cap(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_timeout_secs: default_queue_timeout_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_origins: default_cors_origins(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Limits {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// CPU ceiling in the engine's nano-CPU unit (1e9 per core).
    pub fn nano_cpus(&self) -> i64 {
        (self.cpus * 1_000_000_000.0).round() as i64
    }

    /// tmpfs mount options for the scratch area.
    pub fn scratch_mount_options(&self) -> String {
        format!("rw,noexec,nosuid,size={}", self.scratch_bytes)
    }
}

impl PoolConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

impl SandboxConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.runtime.image.trim().is_empty() {
            return Err(SandboxError::config("runtime.image cannot be empty"));
        }

        if self.runtime.command.is_empty() || self.runtime.command[0].trim().is_empty() {
            return Err(SandboxError::config("runtime.command must name the interpreter to run"));
        }

        if !self.runtime.mount_path.starts_with('/') {
            return Err(SandboxError::config(format!(
                "runtime.mount_path must be absolute, got '{}'",
                self.runtime.mount_path
            )));
        }

        if self.runtime.default_entry_point.trim().is_empty() {
            return Err(SandboxError::config("runtime.default_entry_point cannot be empty"));
        }

        if let Some(user) = &self.runtime.user {
            if user == "root" || user == "0" || user.starts_with("0:") || user.starts_with("root:") {
                return Err(SandboxError::config("runtime.user must not be the administrative user"));
            }
        }

        let limits = &self.limits;
        if limits.timeout_secs == 0 {
            return Err(SandboxError::config("limits.timeout_secs must be greater than 0"));
        }
        // The engine rejects memory limits below 6 MiB.
        if limits.memory_bytes < 6 * 1024 * 1024 {
            return Err(SandboxError::config("limits.memory_bytes must be at least 6 MiB"));
        }
        if !(limits.cpus > 0.0 && limits.cpus.is_finite()) {
            return Err(SandboxError::config("limits.cpus must be a positive number"));
        }
        if limits.scratch_bytes == 0 {
            return Err(SandboxError::config("limits.scratch_bytes must be greater than 0"));
        }
        if limits.pids_limit <= 0 {
            return Err(SandboxError::config("limits.pids_limit must be greater than 0"));
        }
        if limits.stdout_cap == 0 || limits.stderr_cap == 0 {
            return Err(SandboxError::config("output caps must be greater than 0"));
        }

        if self.pool.max_concurrent == 0 {
            return Err(SandboxError::config("pool.max_concurrent must be greater than 0"));
        }

        if self.server.max_body_size == 0 {
            return Err(SandboxError::config("server.max_body_size must be greater than 0"));
        }

        Ok(())
    }
}
