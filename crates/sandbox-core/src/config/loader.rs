//! Configuration loader for YAML files and environment overrides
//!
//! Values are resolved in order: built-in defaults, YAML document,
//! `SANDBOX_*` environment variables. The result is validated before it is
//! handed out.

use crate::config::types::*;
use crate::errors::SandboxError;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<SandboxConfig, SandboxError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            SandboxError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load from `path` when it exists, otherwise start from defaults.
    pub async fn from_file_or_default<P: AsRef<Path>>(
        path: P,
    ) -> Result<SandboxConfig, SandboxError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::from_file(path).await
        } else {
            log::info!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            Self::defaults()
        }
    }

    /// Built-in defaults with environment overrides applied.
    pub fn defaults() -> Result<SandboxConfig, SandboxError> {
        let mut config = SandboxConfig::default();
        Self::resolve_environment(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<SandboxConfig, SandboxError> {
        // An empty document deserializes to unit, not to an empty mapping.
        let mut config: SandboxConfig = if content.trim().is_empty() {
            SandboxConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                SandboxError::config(format!("Failed to parse YAML config: {}", e))
            })?
        };

        Self::resolve_environment(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    /// Apply `SANDBOX_*` environment overrides
    fn resolve_environment(config: &mut SandboxConfig) -> Result<(), SandboxError> {
        if let Ok(image) = env::var("SANDBOX_IMAGE") {
            config.runtime.image = image;
        }

        if let Ok(host) = env::var("SANDBOX_DOCKER_HOST") {
            config.runtime.docker_host = Some(host);
        }

        if let Some(secs) = Self::parse_env::<u64>("SANDBOX_TIMEOUT_SECS")? {
            config.limits.timeout_secs = secs;
        }

        if let Some(max) = Self::parse_env::<usize>("SANDBOX_MAX_CONCURRENT")? {
            config.pool.max_concurrent = max;
        }

        if let Ok(addr) = env::var("SANDBOX_BIND_ADDR") {
            config.server.bind_addr = addr;
        }

        if let Ok(root) = env::var("SANDBOX_WORKSPACE_ROOT") {
            config.workspace.root = Some(PathBuf::from(root));
        }

        Ok(())
    }

    fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, SandboxError>
    where
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                SandboxError::config(format!("Invalid value '{}' for {}: {}", raw, key, e))
            }),
            Err(_) => Ok(None),
        }
    }
}
