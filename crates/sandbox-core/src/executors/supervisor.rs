//! Lifecycle supervision for one container run.
//!
//! ```text
//! Starting ──launch ok──▶ Running ──exit before deadline──▶ Exited
//!     │                      └──────deadline elapsed─────▶ Killed
//!     └──launch error──▶ LaunchFailed
//! ```
//!
//! Exactly one terminal state is reached per run. Whatever that state is,
//! the container is removed before `run` returns, so the caller can tear the
//! workspace down knowing nothing still has it mounted.

use std::time::Duration;

use futures_util::stream::StreamExt;

use super::output::OutputCapture;
use super::{ContainerRuntime, LaunchSpec, OutputStream};
use crate::core_types::ExecutionResult;
use crate::errors::SandboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Exited,
    Killed,
    LaunchFailed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Exited | LifecycleState::Killed | LifecycleState::LaunchFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub state: LifecycleState,
    pub result: ExecutionResult,
}

pub struct Supervisor<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> Supervisor<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Launch `spec`, enforce its deadline and collect its output.
    ///
    /// Returns `Err(LaunchFailure)` when the container never started; every
    /// other outcome, including a timeout, is a `RunOutcome`.
    pub async fn run(&self, spec: &LaunchSpec) -> Result<RunOutcome, SandboxError> {
        log::debug!("{}: {:?}", spec.name, LifecycleState::Starting);

        let id = match self.runtime.launch(spec).await {
            Ok(id) => id,
            Err(e) => {
                log::error!("{}: {:?}: {}", spec.name, LifecycleState::LaunchFailed, e);
                return Err(match e {
                    SandboxError::LaunchFailure { .. } => e,
                    other => SandboxError::launch_failure(other.to_string(), &spec.image),
                });
            }
        };
        log::debug!("{}: {:?} as {}", spec.name, LifecycleState::Running, id);

        let mut capture = OutputCapture::new(spec.limits.stdout_cap, spec.limits.stderr_cap);
        let (state, exit_code) = self
            .supervise(&id, &mut capture, spec.limits.timeout(), spec.limits.kill_grace())
            .await;

        if let Err(e) = self.runtime.remove(&id).await {
            log::error!("Failed to remove container {}: {}", id, e);
        }

        let result = capture.assemble(exit_code, state == LifecycleState::Killed);
        log::info!(
            "{}: {:?} (exit code {}, {} stdout byte(s), {} stderr byte(s))",
            spec.name,
            state,
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );
        Ok(RunOutcome { state, result })
    }

    async fn supervise(
        &self,
        id: &str,
        capture: &mut OutputCapture,
        timeout: Duration,
        kill_grace: Duration,
    ) -> (LifecycleState, Option<i64>) {
        let mut output = self.runtime.output(id);
        let mut output_open = true;
        let mut exit: Option<Option<i64>> = None;

        let wait = self.runtime.wait(id);
        tokio::pin!(wait);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            if let (Some(code), false) = (exit, output_open) {
                return (LifecycleState::Exited, code);
            }

            tokio::select! {
                chunk = output.next(), if output_open => match chunk {
                    Some(Ok(chunk)) => capture.push(&chunk),
                    Some(Err(e)) => {
                        log::warn!("Output stream for container {} failed: {}", id, e);
                        output_open = false;
                    }
                    None => output_open = false,
                },
                status = &mut wait, if exit.is_none() => {
                    exit = Some(match status {
                        Ok(code) => code,
                        Err(e) => {
                            log::error!("Waiting for container {} failed: {}", id, e);
                            None
                        }
                    });
                },
                _ = &mut deadline => {
                    if let Some(code) = exit {
                        // Exited in time; the deadline only bounds the trailing output.
                        log::warn!("Output of container {} still open at deadline, closing it", id);
                        return (LifecycleState::Exited, code);
                    }

                    log::warn!("Execution timed out after {:?} for container {}", timeout, id);
                    if let Err(e) = self.runtime.kill(id).await {
                        log::error!("Failed to kill container {}: {}", id, e);
                    }
                    if output_open {
                        drain(&mut output, capture, kill_grace).await;
                    }
                    let code = match tokio::time::timeout(kill_grace, &mut wait).await {
                        Ok(Ok(code)) => code,
                        Ok(Err(e)) => {
                            log::warn!("Could not confirm container {} stopped: {}", id, e);
                            None
                        }
                        Err(_) => {
                            log::warn!("Container {} still running {:?} after kill", id, kill_grace);
                            None
                        }
                    };
                    return (LifecycleState::Killed, code);
                }
            }
        }
    }
}

/// Keep reading already-produced output for at most `grace`.
async fn drain(output: &mut OutputStream<'_>, capture: &mut OutputCapture, grace: Duration) {
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            chunk = output.next() => match chunk {
                Some(Ok(chunk)) => capture.push(&chunk),
                _ => return,
            },
            _ = &mut deadline => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::core_types::OutputChunk;
    use crate::executors::testing::{ScriptedRuntime, Script};
    use std::path::PathBuf;

    fn spec(timeout_secs: u64) -> LaunchSpec {
        LaunchSpec {
            name: "sandbox-run-test".to_string(),
            image: "sandbox-runner".to_string(),
            command: vec!["node".to_string(), "/sandbox/index.js".to_string()],
            user: None,
            workspace: PathBuf::from("/tmp/unused"),
            mount_path: "/sandbox".to_string(),
            limits: Limits {
                timeout_secs,
                kill_grace_ms: 50,
                ..Limits::default()
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_before_deadline_keeps_exit_code_and_output() {
        let runtime = ScriptedRuntime::new(Script::exits(
            2,
            vec![OutputChunk::stdout("hi\n"), OutputChunk::stderr("boom\n")],
        ));
        let outcome = Supervisor::new(&runtime).run(&spec(10)).await.unwrap();

        assert_eq!(outcome.state, LifecycleState::Exited);
        assert_eq!(outcome.result.stdout, "hi\n");
        assert_eq!(outcome.result.stderr, "boom\n");
        assert_eq!(outcome.result.exit_code, 2);
        assert!(!outcome.result.timed_out);
        assert!(runtime.was_removed());
        assert!(!runtime.was_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_kills_and_preserves_partial_output() {
        let runtime = ScriptedRuntime::new(Script::hangs(vec![OutputChunk::stdout("started\n")]));
        let outcome = Supervisor::new(&runtime).run(&spec(1)).await.unwrap();

        assert_eq!(outcome.state, LifecycleState::Killed);
        assert!(outcome.result.timed_out);
        assert_eq!(outcome.result.stdout, "started\n");
        assert!(runtime.was_killed());
        assert!(runtime.was_removed());
        assert!(!runtime.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_is_distinct_from_kill() {
        let runtime = ScriptedRuntime::new(Script::fails_to_launch());
        let err = Supervisor::new(&runtime).run(&spec(10)).await.unwrap_err();

        assert!(matches!(err, SandboxError::LaunchFailure { .. }));
        assert!(!runtime.was_killed());
        assert!(!runtime.was_removed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_output_after_exit_is_not_a_timeout() {
        let runtime = ScriptedRuntime::new(Script::exits_leaving_output_open(
            3,
            vec![OutputChunk::stdout("done\n")],
        ));
        let outcome = Supervisor::new(&runtime).run(&spec(2)).await.unwrap();

        assert_eq!(outcome.state, LifecycleState::Exited);
        assert!(!outcome.result.timed_out);
        assert_eq!(outcome.result.exit_code, 3);
        assert_eq!(outcome.result.stdout, "done\n");
        assert!(!runtime.was_killed());
        assert!(runtime.was_removed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_is_capped_while_streaming() {
        let chunks = (0..64).map(|_| OutputChunk::stdout(vec![b'a'; 1024])).collect();
        let runtime = ScriptedRuntime::new(Script::exits(0, chunks));
        let outcome = Supervisor::new(&runtime).run(&spec(10)).await.unwrap();

        assert_eq!(outcome.result.stdout.len(), 8192);
        assert_eq!(outcome.result.exit_code, 0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!LifecycleState::Starting.is_terminal());
        assert!(!LifecycleState::Running.is_terminal());
        assert!(LifecycleState::Exited.is_terminal());
        assert!(LifecycleState::Killed.is_terminal());
        assert!(LifecycleState::LaunchFailed.is_terminal());
    }
}
