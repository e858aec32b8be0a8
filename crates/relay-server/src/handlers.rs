//! HTTP handlers and the accept path for Relay.
//!
//! Every upgraded WebSocket becomes one connection: a fresh ID, a registration
//! with the hub, and the two pumps from `relay-transport`.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, Metered};
use anyhow::{bail, Context, Result};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use relay_core::{spawn_hub, ConnectionId, HubHandle};
use relay_transport::{serve_connection, split_socket, ConnectionConfig};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Handle to the hub coordinator.
    pub hub: HubHandle,
    /// Server configuration.
    pub config: Config,
    /// Per-connection settings.
    connection: ConnectionConfig,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(hub: HubHandle, config: Config) -> Self {
        Self {
            hub,
            connection: config.connection_config(),
            config,
        }
    }
}

/// Bind the configured address and run the server.
///
/// # Errors
///
/// Returns an error if the server fails to start or the hub coordinator dies.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Relay server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, config).await
}

/// Run the hub and the HTTP server on an already bound listener.
///
/// # Errors
///
/// Returns an error if the limits are invalid, the HTTP server fails or the
/// hub coordinator exits.
pub async fn serve(listener: TcpListener, config: Config) -> Result<()> {
    config.validate()?;
    let (hub, hub_task) = spawn_hub(config.hub_config());

    if config.metrics.enabled {
        metrics::spawn_stats_task(hub.clone());
    }

    let app = router(Arc::new(AppState::new(hub, config)));

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result.context("HTTP server failed")?;
        }
        result = hub_task => {
            // The app state keeps a handle alive, so the coordinator never
            // finishes on its own
            match result {
                Ok(()) => bail!("Hub coordinator exited"),
                Err(e) => bail!("Hub coordinator failed: {}", e),
            }
        }
    }

    Ok(())
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, any(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => axum::Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "members": stats.members,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({
                "status": "unavailable",
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

/// WebSocket upgrade handler.
///
/// Origins are not checked. Requests that cannot be upgraded get a 404,
/// whatever their method.
async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match ws {
        Ok(ws) => ws
            .max_message_size(state.config.limits.max_message_size)
            .on_failed_upgrade(|e| {
                warn!(error = %e, "WebSocket upgrade failed");
                metrics::record_error("upgrade");
            })
            .on_upgrade(move |socket| handle_websocket(socket, state)),
        Err(rejection) => {
            debug!(error = %rejection, "Rejected non-WebSocket request");
            metrics::record_error("upgrade");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Handle an upgraded WebSocket until it closes.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let id = ConnectionId::generate();
    let (reader, writer) = split_socket(socket);

    if let Err(e) = serve_connection(
        &state.hub,
        id.clone(),
        Metered(reader),
        Metered(writer),
        &state.connection,
    )
    .await
    {
        error!(connection = %id, error = %e, "Failed to register connection");
    }
}
