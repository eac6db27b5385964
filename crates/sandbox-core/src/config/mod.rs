//! Configuration module for the sandbox executor
//!
//! Resource ceilings, the runner image and the HTTP surface are all held in
//! one `SandboxConfig` passed into the executor, so a deployment can tune
//! them without recompiling.

pub mod types;
pub mod loader;

pub use types::*;
pub use loader::*;


use crate::errors::SandboxError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<SandboxConfig, SandboxError> {
    ConfigLoader::from_file(path).await
}
