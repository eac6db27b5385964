// src/executors/docker.rs
use std::collections::HashMap;
use std::default::Default;

use async_trait::async_trait;
use bollard::container::LogOutput; // For LogOutput::StdOut, LogOutput::StdErr
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    KillContainerOptions as BollardKillContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;

use super::{ContainerRuntime, LaunchSpec, OutputStream};
use crate::core_types::OutputChunk;
use crate::errors::SandboxError;

const CONNECT_TIMEOUT_SECS: u64 = 120;
const MANAGED_BY_LABEL: &str = "managed-by";
const MANAGED_BY_VALUE: &str = "sandbox";

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the local defaults (unix socket or `DOCKER_HOST`).
    pub fn connect_local() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Connect to an explicit engine endpoint (`unix://...`, `tcp://...`, `http://...`).
    pub fn connect(host: Option<&str>) -> Result<Self, SandboxError> {
        let docker = match host {
            None => return Self::connect_local(),
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_socket(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            Some(host) => {
                Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
        };
        Ok(Self { docker })
    }

    /// Hardened create body for one run. Every field here is part of the
    /// isolation profile; none of it is influenced by the request.
    fn container_config(spec: &LaunchSpec) -> ContainerCreateBody {
        let limits = &spec.limits;

        let mut tmpfs = HashMap::new();
        tmpfs.insert("/tmp".to_string(), limits.scratch_mount_options());

        let mut labels = HashMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

        ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.mount_path.clone()),
            user: spec.user.clone(),
            network_disabled: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            labels: Some(labels),
            host_config: Some(HostConfig {
                binds: Some(vec![format!(
                    "{}:{}:ro",
                    spec.workspace.display(),
                    spec.mount_path
                )]),
                network_mode: Some("none".to_string()),
                memory: Some(limits.memory_bytes),
                memory_swap: Some(limits.memory_bytes),
                nano_cpus: Some(limits.nano_cpus()),
                pids_limit: Some(limits.pids_limit),
                readonly_rootfs: Some(true),
                tmpfs: Some(tmpfs),
                cap_drop: Some(vec!["ALL".to_string()]),
                security_opt: Some(vec!["no-new-privileges".to_string()]),
                // Removal is explicit so logs stay readable until the supervisor is done.
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError { status_code: 404, .. }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), SandboxError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn image_available(&self, image: &str) -> Result<bool, SandboxError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String, SandboxError> {
        match self.image_available(&spec.image).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(SandboxError::launch_failure(
                    format!("image '{}' was not found", spec.image),
                    &spec.image,
                ))
            }
            Err(e) => {
                return Err(SandboxError::launch_failure(
                    format!("Docker engine is not reachable: {}", e),
                    &spec.image,
                ))
            }
        }

        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        let container = self
            .docker
            .create_container(options, Self::container_config(spec))
            .await
            .map_err(|e| {
                SandboxError::launch_failure(format!("could not create container: {}", e), &spec.image)
            })?;

        for warning in &container.warnings {
            log::warn!("Docker warning for {}: {}", spec.name, warning);
        }

        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<BollardStartContainerOptionsQuery>)
            .await
        {
            if let Err(cleanup) = self.remove(&container.id).await {
                log::error!("Failed to remove unstarted container {}: {}", container.id, cleanup);
            }
            return Err(SandboxError::launch_failure(
                format!("could not start container: {}", e),
                &spec.image,
            ));
        }

        Ok(container.id)
    }

    fn output<'a>(&'a self, id: &'a str) -> OutputStream<'a> {
        self.docker
            .logs(
                id,
                Some(BollardLogsOptionsQuery {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    ..Default::default()
                }),
            )
            .filter_map(|item| async move {
                match item {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        Some(Ok(OutputChunk::stdout(message.to_vec())))
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        Some(Ok(OutputChunk::stderr(message.to_vec())))
                    }
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(SandboxError::Docker(e))),
                }
            })
            .boxed()
    }

    async fn wait(&self, id: &str) -> Result<Option<i64>, SandboxError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<BollardWaitContainerOptionsQuery>);

        match stream.next().await {
            Some(Ok(response)) => Ok(Some(response.status_code)),
            // bollard reports a non-zero exit as an error carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(Some(code)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    async fn kill(&self, id: &str) -> Result<(), SandboxError> {
        match self
            .docker
            .kill_container(id, None::<BollardKillContainerOptionsQuery>)
            .await
        {
            Ok(()) => Ok(()),
            // 409: the container already stopped on its own.
            Err(BollardError::DockerResponseServerError { status_code: 409, .. }) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), SandboxError> {
        let options = Some(BollardRemoveContainerOptionsQuery {
            force: true,
            v: true,
            ..Default::default()
        });
        match self.docker.remove_container(id, options).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
