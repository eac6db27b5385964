//! Core library for running untrusted code in resource-capped containers.
//!
//! A submission is a small set of files plus an entry point. The executor
//! stages the files into a private workspace, runs the entry point inside a
//! hardened container with no network, bounded memory, CPU, processes and
//! scratch space, and a wall-clock deadline, then reports what happened.
//!
//! # Architecture Overview
//!
//! - **Workspace management**: per-request temporary directories, removed on every exit path
//! - **Container runtime**: the `ContainerRuntime` seam with a Docker implementation
//! - **Lifecycle supervision**: deadline enforcement, forced kill, bounded output capture
//! - **Verdict evaluation**: a restricted predicate language scored against the entry point
//! - **Admission control**: bounded concurrency with a queue timeout
//! - **Configuration system**: YAML configuration with environment overrides

pub mod config;
pub mod core_types;
pub mod errors;
pub mod executor;
pub mod executors;
pub mod verdict;
pub mod workspace;

pub use config::*;
pub use core_types::{ExecutionReport, ExecutionRequest, ExecutionResult, OutputChunk, StreamKind};
pub use errors::SandboxError;
pub use executor::SandboxExecutor;
pub use executors::{ContainerRuntime, DockerRuntime, LaunchSpec};
pub use workspace::Workspace;
