//! Scrape endpoint for the capture counters.
//!
//! Serves the [`MetricsRegistry`] text encoding on `/metrics` and a
//! one-line camera status on `/health`. The capture loop pushes
//! [`MetricsSnapshot`]s through a shared [`MetricsState`] while the
//! server runs on its own runtime.

use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 9090;

/// Errors from running the scrape endpoint.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind metrics address: {0}")]
    Bind(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("metrics server failed: {0}")]
    Server(String),
}

/// Where the scrape endpoint listens.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Listen address; loopback unless set explicitly.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(DEFAULT_PORT)
    }
}

impl MetricsServerConfig {
    /// Loopback address on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], port).into(),
        }
    }
}

/// Capture metrics shared between the capture loop and the server.
///
/// Collectors are internally synchronized, so no lock is held while a
/// scrape is encoded.
pub struct MetricsState {
    registry: MetricsRegistry,
    device_open: AtomicBool,
    frames_captured: AtomicU64,
}

impl MetricsState {
    fn new(registry: MetricsRegistry) -> Self {
        Self {
            registry,
            device_open: AtomicBool::new(false),
            frames_captured: AtomicU64::new(0),
        }
    }

    /// Records the latest source snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.registry.update(snapshot);
        self.device_open.store(snapshot.device_open, Ordering::Relaxed);
        self.frames_captured.store(snapshot.frames_captured, Ordering::Relaxed);
    }

    /// Status line served on `/health`.
    pub fn status(&self) -> String {
        let camera = if self.device_open.load(Ordering::Relaxed) {
            "open"
        } else {
            "closed"
        };
        format!(
            "OK camera={} frames={}",
            camera,
            self.frames_captured.load(Ordering::Relaxed)
        )
    }
}

/// Scrape endpoint for a capture session.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: Arc<MetricsState>,
}

impl MetricsServer {
    /// Server exporting `registry` at `config.bind_addr`.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(MetricsState::new(registry)),
        }
    }

    /// Handle the capture loop updates through.
    pub fn state(&self) -> Arc<MetricsState> {
        Arc::clone(&self.state)
    }

    /// Routes served by [`run`](Self::run).
    pub fn router(&self) -> Router {
        // Read-only endpoints; browsers may scrape from any origin.
        let cors = CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_origin(Any);

        Router::new()
            .route("/metrics", get(scrape))
            .route("/health", get(health))
            .layer(cors)
            .with_state(self.state())
    }

    /// Binds and serves until the runtime shuts down.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(addr = %self.config.bind_addr, "serving capture metrics");

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }
}

async fn scrape(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    match state.registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::warn!(error = %e, "cannot encode capture metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("cannot encode capture metrics: {}", e),
            )
        }
    }
}

async fn health(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    (StatusCode::OK, state.status())
}
