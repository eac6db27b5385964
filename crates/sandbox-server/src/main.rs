//! Sandbox server: HTTP API and operator commands for the code executor
//!
//! `run` (the default) serves `/execute` and `/health`; `check` verifies that
//! the Docker engine answers and the runner image is present; `exec` runs a
//! local directory once and prints the JSON report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use sandbox_core::{ConfigLoader, DockerRuntime, ExecutionRequest, SandboxConfig, SandboxExecutor};
use sandbox_server::{shutdown_signal, SandboxServer, ServerConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Sandbox Server - run untrusted code in isolated containers")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, default_value = "sandbox.yaml", help = "Configuration file; defaults are used when it does not exist")]
    config: PathBuf,

    #[clap(long, help = "Override the configured bind address")]
    bind_addr: Option<String>,

    #[clap(long, short, help = "Log level (defaults to the configured level)")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default command)
    Run,
    /// Check that Docker is reachable and the runner image is present
    Check,
    /// Execute a local directory once and print the report as JSON
    Exec {
        /// Directory whose files are submitted
        dir: PathBuf,

        #[clap(long, short, help = "Entry point relative to the directory")]
        entry_point: Option<String>,

        #[clap(long, help = "Verdict predicate, e.g. \"return code.includes('taxRate')\"")]
        test_check: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The logger exists before the config is read; the configured level applies afterwards.
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .init();
    log::set_max_level(parse_level(cli.log_level.as_deref().unwrap_or("info")));

    let config = ConfigLoader::from_file_or_default(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    if cli.log_level.is_none() {
        log::set_max_level(parse_level(&config.logging.level));
    }

    let runtime = DockerRuntime::connect(config.runtime.docker_host.as_deref())
        .context("Failed to create Docker client")?;
    let executor = Arc::new(SandboxExecutor::new(Arc::new(runtime), config.clone()));

    match cli.command {
        None | Some(Commands::Run) => run_server(executor, &config, cli.bind_addr).await,
        Some(Commands::Check) => {
            executor.check_environment().await?;
            println!(
                "Docker engine is reachable and image '{}' is present.",
                config.runtime.image
            );
            Ok(())
        }
        Some(Commands::Exec {
            dir,
            entry_point,
            test_check,
        }) => {
            let entry_point = entry_point.unwrap_or_else(|| config.runtime.default_entry_point.clone());
            exec_directory(&executor, &dir, entry_point, test_check).await
        }
    }
}

fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

async fn run_server(
    executor: Arc<SandboxExecutor>,
    config: &SandboxConfig,
    bind_addr: Option<String>,
) -> Result<()> {
    let mut server_config = ServerConfig::from_sandbox_config(config)?;
    if let Some(bind_addr) = bind_addr {
        server_config = server_config.with_bind_addr_str(&bind_addr)?;
    }

    // Serving still makes sense while Docker comes up; every request reports the problem.
    if let Err(e) = executor.check_environment().await {
        log::warn!("{}", e);
    }

    log::info!(
        "Limits: {}s timeout, {} MiB memory, {} CPU, {} concurrent",
        config.limits.timeout_secs,
        config.limits.memory_bytes / (1024 * 1024),
        config.limits.cpus,
        config.pool.max_concurrent
    );

    let server = SandboxServer::with_config(executor, server_config);
    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn exec_directory(
    executor: &SandboxExecutor,
    dir: &Path,
    entry_point: String,
    test_check: Option<String>,
) -> Result<()> {
    let files = read_directory(dir).await?;
    log::info!("Submitting {} file(s) from {}", files.len(), dir.display());

    let mut request = ExecutionRequest::new(files, entry_point);
    request.test_check = test_check;

    let report = executor.execute(&request).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Collect every regular file under `dir`, keyed by its `/`-separated relative path.
async fn read_directory(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .with_context(|| format!("Failed to read directory {}", current.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(dir)?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {} as UTF-8", path.display()))?;
                files.insert(relative, content);
            }
        }
    }

    Ok(files)
}
