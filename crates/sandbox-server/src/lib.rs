//! HTTP surface for the sandboxed code executor
//!
//! Exposes `POST /execute`, which stages the submitted files, runs the entry
//! point in an isolated container and returns its output together with the
//! verdict, and `GET /health` for readiness probes. Requests are logged with a
//! per-request id; bodies are size-capped and CORS is restricted to the
//! configured origins.

pub mod api;
pub mod error;

pub use api::{ExecuteRequest, FileContent, HealthResponse};
pub use error::{Result, ServerError};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method};
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use sandbox_core::{ExecutionReport, SandboxConfig, SandboxExecutor};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Allowed CORS origins; `*` allows any origin
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Entry point used when a `files` submission names none
    pub default_entry_point: String,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            max_body_size: 256 * 1024,
            default_entry_point: "index.js".to_string(),
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Derive the HTTP settings from a loaded sandbox configuration.
    pub fn from_sandbox_config(config: &SandboxConfig) -> Result<Self> {
        let server = Self {
            cors_origins: config.server.cors_origins.clone(),
            max_body_size: config.server.max_body_size,
            default_entry_point: config.runtime.default_entry_point.clone(),
            ..Self::default()
        };
        server.with_bind_addr_str(&config.server.bind_addr)
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);

        if self.cors_origins.iter().any(|origin| origin == "*") {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();
        layer.allow_origin(origins)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<SandboxExecutor>,
    pub config: ServerConfig,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Handler for the /execute POST endpoint.
async fn execute_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecutionReport>> {
    let Json(payload) = payload?;
    let request = payload.into_request(&state.config.default_entry_point)?;
    log::debug!(
        "Executing {} file(s), entry point '{}'",
        request.files.len(),
        request.entry_point
    );

    let report = state.executor.execute(&request).await?;
    log::info!(
        "Execution finished: exit code {}, timed out {}, passed {}",
        report.exit_code,
        report.timed_out,
        report.passed
    );
    Ok(Json(report))
}

/// HTTP server in front of one shared executor.
pub struct SandboxServer {
    executor: Arc<SandboxExecutor>,
    config: ServerConfig,
}

impl SandboxServer {
    /// Create a new server with default HTTP configuration.
    pub fn new(executor: Arc<SandboxExecutor>) -> Self {
        Self {
            executor,
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(executor: Arc<SandboxExecutor>, config: ServerConfig) -> Self {
        Self { executor, config }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            executor: self.executor.clone(),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/execute", post(execute_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.config.max_body_size));

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // Readiness probes poll constantly.
                    if uri.path() == "/health" {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    if uri.path() == "/health" {
                        log::debug!("Response {} {} in {:?}", request_id, response.status(), duration);
                    } else {
                        log::info!("Response {} {} in {:?}", request_id, response.status(), duration);
                    }

                    response
                },
            ));
        }

        router
            .layer(TraceLayer::new_for_http())
            .layer(self.config.cors_layer())
    }

    /// Start the server with graceful shutdown support.
    ///
    /// In-flight executions finish (and clean up) before this returns.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("Sandbox API running at http://{}", self.config.bind_addr);
        log::info!("  POST http://{}/execute", self.config.bind_addr);
        log::info!("  GET  http://{}/health", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("Sandbox server shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
