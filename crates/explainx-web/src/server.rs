//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use explainx::coordinator::CoordinatorHandle;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;
use tracing::error;

use crate::api::{self, AppState};
use crate::broadcast::WsMessage;
use crate::origin::{self, AllowedOrigins};
use crate::ws::{self, WsState};

/// Build the full axum router.
///
/// The router serves:
/// - WebSocket at `/ws`
/// - REST API at `/api/*`
/// - Optional static files for the history viewer
///
/// API and WebSocket routes only answer browsers on this server's own origin
/// or on one of `allowed_origins`.
pub fn build_router(
    handle: CoordinatorHandle,
    broadcast_tx: broadcast::Sender<WsMessage>,
    static_dir: Option<PathBuf>,
    allowed_origins: AllowedOrigins,
) -> Router {
    let app_state = AppState {
        handle: handle.clone(),
    };

    let ws_state = WsState {
        handle,
        broadcast_tx,
    };

    let cors = allowed_origins.cors_layer();

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .with_state(ws_state);

    let api_routes = Router::new()
        .route("/api/message", post(api::post_message))
        .route("/api/summaries", get(api::get_summaries))
        .with_state(app_state);

    let mut router = Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .layer(middleware::from_fn_with_state(
            allowed_origins,
            origin::require_trusted_origin,
        ))
        .layer(cors);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// Bind `bind_addr`, start serving on a Tokio task, and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> Result<SocketAddr, String> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| format!("failed to bind {bind_addr}: {e}"))?;
    let addr = listener
        .local_addr()
        .map_err(|e| format!("failed to read bound address: {e}"))?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Web server stopped: {e}");
        }
    });

    Ok(addr)
}
