//! Code execution environments for sandboxed runtime evaluation.
//!
//! `ContainerRuntime` is the seam between lifecycle supervision and the
//! container engine. The Docker implementation talks to the engine through
//! bollard; tests drive the supervisor with scripted runtimes instead.

use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::Limits;
use crate::core_types::OutputChunk;
use crate::errors::SandboxError;

pub mod docker;
pub mod output;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use docker::DockerRuntime;
pub use output::{OutputCapture, KILLED_EXIT_CODE};
pub use supervisor::{LifecycleState, RunOutcome, Supervisor};

/// Everything the engine needs to start one isolated run.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Unique container name.
    pub name: String,
    pub image: String,
    /// Full argv, entry point path included.
    pub command: Vec<String>,
    pub user: Option<String>,
    /// Host directory mounted read-only at `mount_path`.
    pub workspace: PathBuf,
    pub mount_path: String,
    pub limits: Limits,
}

/// Output chunks in production order. Ends when the container's streams close.
pub type OutputStream<'a> = BoxStream<'a, Result<OutputChunk, SandboxError>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the engine answers at all.
    async fn ping(&self) -> Result<(), SandboxError>;

    /// Check that `image` is present locally.
    async fn image_available(&self, image: &str) -> Result<bool, SandboxError>;

    /// Create and start a container. Any error here means nothing is running
    /// and nothing is left behind.
    async fn launch(&self, spec: &LaunchSpec) -> Result<String, SandboxError>;

    /// Follow the container's stdout and stderr from the start of the run.
    fn output<'a>(&'a self, id: &'a str) -> OutputStream<'a>;

    /// Resolve once the container stopped, with its exit code if the engine reports one.
    async fn wait(&self, id: &str) -> Result<Option<i64>, SandboxError>;

    /// Non-graceful termination.
    async fn kill(&self, id: &str) -> Result<(), SandboxError>;

    /// Reclaim the container and its writable layers. Missing containers are not an error.
    async fn remove(&self, id: &str) -> Result<(), SandboxError>;
}
