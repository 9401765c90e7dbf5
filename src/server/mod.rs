use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::bundles::HttpBundleManager;
use crate::context::RequestContext;
use crate::storage::MAX_TRAVERSAL_LIMIT;

pub mod routes;

/// Server state
///
/// Handlers open their own store from `database_path`, so no connection is
/// shared between requests.
#[derive(Debug, Clone)]
pub struct AppState {
    pub database_path: PathBuf,
    pub bundles: HttpBundleManager,
    pub traversal_limit: usize,
    pub request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(database_path: PathBuf, bundles: HttpBundleManager) -> Self {
        Self {
            database_path,
            bundles,
            traversal_limit: MAX_TRAVERSAL_LIMIT,
            request_timeout: None,
        }
    }

    pub fn with_traversal_limit(mut self, limit: usize) -> Self {
        self.traversal_limit = limit;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_context(&self) -> RequestContext {
        match self.request_timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::background(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/stats", get(routes::get_stats))
        .route("/packages", get(routes::get_package))
        .route("/references", get(routes::get_references))
        .route("/monikers", get(routes::resolve_moniker))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Serve until the first SIGINT/SIGHUP, then drain in-flight requests.
/// A second signal exits the process immediately.
pub async fn start_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    wait_for_signal().await;
    tracing::info!("Shutting down, waiting for in-flight requests");

    tokio::spawn(async {
        wait_for_signal().await;
        tracing::warn!("Second signal received, exiting immediately");
        std::process::exit(1);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to install SIGINT handler: {}", e);
            return std::future::pending().await;
        }
    };
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to install SIGHUP handler: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = hangup.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
