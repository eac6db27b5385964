//! The sandbox executor: one call per submission.
//!
//! `execute` validates the request, waits for an execution slot, stages the
//! files into a fresh workspace, runs the entry point under supervision,
//! tears the workspace down and finally scores the submission. Admission is
//! bounded by a semaphore so a burst of requests queues instead of starting
//! an unbounded number of containers.

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::config::SandboxConfig;
use crate::core_types::{ExecutionReport, ExecutionRequest, ExecutionResult};
use crate::errors::{Result, SandboxError};
use crate::executors::{ContainerRuntime, LaunchSpec, Supervisor};
use crate::verdict;
use crate::workspace::{container_path, Workspace};

/// Cheap to share; every run is driven by a task of its own.
pub struct SandboxExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    runtime: Arc<dyn ContainerRuntime>,
    config: SandboxConfig,
    permits: Semaphore,
}

impl SandboxExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SandboxConfig) -> Self {
        let permits = Semaphore::new(config.pool.max_concurrent);
        Self {
            inner: Arc::new(ExecutorInner {
                runtime,
                config,
                permits,
            }),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    /// Number of execution slots currently free.
    pub fn available_slots(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Fail fast when the engine is unreachable or the runner image is missing.
    pub async fn check_environment(&self) -> Result<()> {
        let image = &self.inner.config.runtime.image;
        if let Err(e) = self.inner.runtime.ping().await {
            return Err(SandboxError::launch_failure(
                format!("Docker engine is not reachable: {}", e),
                image,
            ));
        }
        if !self.inner.runtime.image_available(image).await? {
            return Err(SandboxError::launch_failure(
                format!("image '{}' was not found", image),
                image,
            ));
        }
        log::info!("Docker engine reachable, image '{}' present", image);
        Ok(())
    }

    /// Run the request and score it.
    ///
    /// A workspace that could not be staged is reported as a run that never
    /// started (exit code 1, diagnostic on stderr) rather than as an error.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport> {
        let result = match self.run(request).await {
            Ok(result) => result,
            Err(e @ SandboxError::WorkspacePreparation(_)) => {
                log::error!("{}", e);
                ExecutionResult::not_started(e.to_string())
            }
            Err(e) => return Err(e),
        };
        let passed = verdict::evaluate(request.test_check.as_deref(), request.entry_source());
        Ok(ExecutionReport::new(result, passed))
    }

    /// Run the request without scoring it.
    ///
    /// The run continues on its own task when the returned future is
    /// dropped, so the deadline, the container removal and the workspace
    /// teardown still happen in order and the execution slot stays taken
    /// until they have.
    pub async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;

        let inner = self.inner.clone();
        let request = request.clone();
        let task = tokio::spawn(async move { inner.run(&request).await });

        task.await.map_err(|e| SandboxError::Internal(e.to_string()))?
    }
}

impl ExecutorInner {
    async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let entry = container_path(&self.config.runtime.mount_path, &request.entry_point)?;

        let _permit = self.admit().await?;

        let workspace =
            Workspace::prepare(self.config.workspace.root.as_deref(), &request.files).await?;

        let mut command = self.config.runtime.command.clone();
        command.push(entry);
        let spec = LaunchSpec {
            name: format!("sandbox-run-{}", uuid::Uuid::new_v4()),
            image: self.config.runtime.image.clone(),
            command,
            user: self.config.runtime.user.clone(),
            workspace: workspace.path().to_path_buf(),
            mount_path: self.config.runtime.mount_path.clone(),
            limits: self.config.limits.clone(),
        };

        // The supervisor removes the container before returning, so the
        // workspace is no longer mounted once we get here.
        let outcome = Supervisor::new(self.runtime.as_ref()).run(&spec).await;

        if let Err(e) = workspace.close() {
            log::error!("Failed to remove workspace for {}: {}", spec.name, e);
        }

        Ok(outcome?.result)
    }

    async fn admit(&self) -> Result<SemaphorePermit<'_>> {
        let max_concurrent = self.config.pool.max_concurrent;
        match tokio::time::timeout(self.config.pool.queue_timeout(), self.permits.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) | Err(_) => {
                log::warn!(
                    "No execution slot free after {:?} ({} running)",
                    self.config.pool.queue_timeout(),
                    max_concurrent
                );
                Err(SandboxError::Saturated { max_concurrent })
            }
        }
    }
}
