//! Read-only telemetry server.
//!
//! Serves the latest [`TelemetrySnapshot`] published by the engine over
//! two surfaces: `GET /api/status` for polling and `GET /ws` for the
//! streaming dashboard. Consumers only ever see complete snapshots; the
//! engine publishes them synchronously between ticks.

use crate::{handlers, websocket};
use axum::{routing::get, Router};
use paperbot_core::TelemetrySnapshot;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state: the latest snapshot, if the engine has produced one.
#[derive(Clone)]
pub struct ApiState {
    /// Watch side of the engine's snapshot channel.
    pub snapshot_rx: watch::Receiver<Option<TelemetrySnapshot>>,
}

/// Telemetry API server.
pub struct ApiServer {
    state: ApiState,
}

impl ApiServer {
    /// Creates a server over the engine's snapshot channel.
    #[must_use]
    pub fn new(snapshot_rx: watch::Receiver<Option<TelemetrySnapshot>>) -> Self {
        Self {
            state: ApiState { snapshot_rx },
        }
    }

    /// Builds the router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/status", get(handlers::status))
            .route("/ws", get(websocket::websocket_handler))
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Binds and serves until the process exits.
    ///
    /// # Errors
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Telemetry API listening on {}", addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
