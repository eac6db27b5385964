//! Scripted `ContainerRuntime` for exercising supervision without an engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;

use super::{ContainerRuntime, LaunchSpec, OutputStream};
use crate::core_types::OutputChunk;
use crate::errors::SandboxError;

#[derive(Debug, Clone)]
pub enum Script {
    /// Produce `chunks`, then exit with `code` after `delay`.
    Exits {
        code: i64,
        chunks: Vec<OutputChunk>,
        delay: Duration,
    },
    /// Produce `chunks`, then run until killed.
    Hangs { chunks: Vec<OutputChunk> },
    /// Exit with `code` at once, but never close the output stream.
    ExitsLeavingOutputOpen { code: i64, chunks: Vec<OutputChunk> },
    FailsToLaunch,
}

impl Script {
    pub fn exits(code: i64, chunks: Vec<OutputChunk>) -> Self {
        Script::Exits { code, chunks, delay: Duration::ZERO }
    }

    pub fn exits_after(code: i64, chunks: Vec<OutputChunk>, delay: Duration) -> Self {
        Script::Exits { code, chunks, delay }
    }

    pub fn hangs(chunks: Vec<OutputChunk>) -> Self {
        Script::Hangs { chunks }
    }

    pub fn exits_leaving_output_open(code: i64, chunks: Vec<OutputChunk>) -> Self {
        Script::ExitsLeavingOutputOpen { code, chunks }
    }

    pub fn fails_to_launch() -> Self {
        Script::FailsToLaunch
    }
}

#[derive(Debug, Default)]
struct Record {
    launched: Vec<LaunchSpec>,
    workspace_existed: Vec<bool>,
    workspace_at_removal: Vec<bool>,
    killed: bool,
    removed: usize,
}

pub struct ScriptedRuntime {
    script: Script,
    record: Mutex<Record>,
    stopped: watch::Sender<bool>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedRuntime {
    pub fn new(script: Script) -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            script,
            record: Mutex::new(Record::default()),
            stopped,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn was_killed(&self) -> bool {
        self.record.lock().unwrap().killed
    }

    pub fn was_removed(&self) -> bool {
        self.record.lock().unwrap().removed > 0
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.record.lock().unwrap().launched.clone()
    }

    /// Whether each launched workspace was on disk at launch time.
    pub fn workspace_existed(&self) -> Vec<bool> {
        self.record.lock().unwrap().workspace_existed.clone()
    }

    /// Whether the workspace was still on disk when each container was removed.
    pub fn workspace_present_at_removal(&self) -> Vec<bool> {
        self.record.lock().unwrap().workspace_at_removal.clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn until_killed(mut stopped: watch::Receiver<bool>) {
        let _ = stopped.wait_for(|killed| *killed).await;
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn ping(&self) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn image_available(&self, _image: &str) -> Result<bool, SandboxError> {
        Ok(!matches!(self.script, Script::FailsToLaunch))
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String, SandboxError> {
        if let Script::FailsToLaunch = self.script {
            return Err(SandboxError::launch_failure("engine unreachable", &spec.image));
        }
        let mut record = self.record.lock().unwrap();
        record.launched.push(spec.clone());
        record.workspace_existed.push(spec.workspace.exists());
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);
        Ok(spec.name.clone())
    }

    fn output<'a>(&'a self, _id: &'a str) -> OutputStream<'a> {
        match &self.script {
            Script::Exits { chunks, .. } => stream::iter(chunks.clone().into_iter().map(Ok)).boxed(),
            Script::Hangs { chunks } => {
                let stopped = self.stopped.subscribe();
                stream::iter(chunks.clone().into_iter().map(Ok))
                    .chain(
                        stream::once(Self::until_killed(stopped))
                            .filter_map(|_| async { None::<Result<OutputChunk, SandboxError>> }),
                    )
                    .boxed()
            }
            Script::ExitsLeavingOutputOpen { chunks, .. } => {
                stream::iter(chunks.clone().into_iter().map(Ok))
                    .chain(stream::pending())
                    .boxed()
            }
            Script::FailsToLaunch => stream::empty().boxed(),
        }
    }

    async fn wait(&self, _id: &str) -> Result<Option<i64>, SandboxError> {
        match &self.script {
            Script::Exits { code, delay, .. } => {
                tokio::time::sleep(*delay).await;
                Ok(Some(*code))
            }
            Script::Hangs { .. } => {
                Self::until_killed(self.stopped.subscribe()).await;
                Ok(Some(137))
            }
            Script::ExitsLeavingOutputOpen { code, .. } => Ok(Some(*code)),
            Script::FailsToLaunch => Ok(None),
        }
    }

    async fn kill(&self, _id: &str) -> Result<(), SandboxError> {
        self.record.lock().unwrap().killed = true;
        self.stopped.send_replace(true);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), SandboxError> {
        let mut record = self.record.lock().unwrap();
        let present = record
            .launched
            .iter()
            .find(|spec| spec.name == id)
            .map(|spec| spec.workspace.exists());
        if let Some(present) = present {
            record.workspace_at_removal.push(present);
        }
        record.removed += 1;
        drop(record);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
