use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use agora_engine::DebateEngine;

use crate::client::ConnectionTracker;
use crate::config::ServerConfig;
use crate::shutdown::ShutdownCoordinator;
use crate::{admin, health, observer, participant};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: DebateEngine,
    pub config: Arc<ServerConfig>,
    /// `None` when no recorder was installed (tests).
    pub metrics: Option<PrometheusHandle>,
    pub connections: Arc<ConnectionTracker>,
    pub shutdown: ShutdownCoordinator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: DebateEngine, config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            engine,
            config: Arc::new(config),
            metrics,
            connections: Arc::new(ConnectionTracker::default()),
            shutdown: ShutdownCoordinator::new(),
            started_at: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/debate", get(participant::upgrade))
        .route("/frontend", get(observer::upgrade))
        .route("/api/debate/create", post(admin::create_debate))
        .route("/api/debates", get(admin::list_debates))
        .route("/api/debate/{id}", get(admin::get_debate))
        .route("/health", get(health::health_handler))
        .route("/metrics", get(health::metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener and start serving. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    engine: DebateEngine,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    let shutdown_timeout = config.shutdown_timeout;

    let state = AppState::new(engine.clone(), config, metrics);
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    let stop = shutdown.token();
    let server = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router)
            .with_graceful_shutdown(stop.cancelled_owned())
            .await
        {
            error!(%error, "server stopped with error");
        }
    });

    info!(%addr, "agora server started");

    Ok(ServerHandle {
        addr,
        engine,
        shutdown,
        shutdown_timeout,
        server,
    })
}

/// Handle returned by [`start`]. Dropping it leaves the server running.
pub struct ServerHandle {
    pub addr: SocketAddr,
    engine: DebateEngine,
    shutdown: ShutdownCoordinator,
    shutdown_timeout: std::time::Duration,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Stop accepting connections, close every socket, and wait for the
    /// connection tasks. Live sessions stay persisted for the next start.
    pub async fn shutdown(self) -> bool {
        info!("shutting down");
        self.engine.shutdown();
        self.shutdown
            .graceful_shutdown(vec![self.server], self.shutdown_timeout)
            .await
    }
}
