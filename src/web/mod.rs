//! Web server module: the invocation surface.

mod handlers;

pub use handlers::*;

use crate::check::Checker;
use crate::config::Config;
use crate::db::Store;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub checker: Arc<Checker>,
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check", post(handlers::handle_check))
        .route("/healthz", get(handlers::handle_healthz))
        .route("/api/results/{target_id}", get(handlers::handle_get_results))
        .route("/api/status/{target_id}", get(handlers::handle_get_status))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}

/// HTTP server accepting check invocations.
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: Config, store: Arc<Store>, checker: Arc<Checker>) -> Self {
        Self {
            config,
            state: AppState { store, checker },
        }
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = router(self.state.clone());

        tracing::info!("Listening for checks on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
