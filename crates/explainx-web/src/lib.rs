//! HTTP and WebSocket front door for the explainx coordinator.
//!
//! `explainx-web` makes a running [`Coordinator`](explainx::coordinator::Coordinator)
//! addressable from browser contexts: the page dialog and the history viewer
//! talk to it over `POST /api/message` or a `/ws` WebSocket using the same
//! request/response protocol the in-process handle uses.
//!
//! # Quick start
//!
//! ```ignore
//! use explainx_web::{WebConfig, spawn_web};
//!
//! let handle = coordinator.spawn()?;
//! let addr = spawn_web(handle, WebConfig::default()).await?;
//! println!("Listening on http://{addr}");
//! ```
//!
//! # Architecture
//!
//! ```text
//! page dialog ──POST /api/message──┐
//!                                  ├──▶ CoordinatorHandle ──▶ Coordinator task
//! history viewer ──/ws {id,request}┘          │
//!        ▲                                    │ StoreEvent
//!        └──── summaries_changed ◀── forward_store_events
//! ```
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /api/message` | One [`Request`](explainx::protocol::Request) in, one [`Response`](explainx::protocol::Response) out |
//! | `GET /api/summaries` | History array, newest first |
//! | `GET /ws` | Correlated request/reply plus store-change notifications |
//!
//! Browser callers must be on the server's own origin or listed in
//! [`WebConfig::allowed_origins`]; anything else gets `403` and no CORS
//! headers.

mod api;
pub mod broadcast;
mod origin;
mod server;
mod ws;

pub use broadcast::{WsMessage, forward_store_events};

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::HeaderValue;
use explainx::coordinator::CoordinatorHandle;

use crate::origin::AllowedOrigins;

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Directory of static files (e.g. a history viewer) served at `/`.
    ///
    /// If `None`, only API/WS endpoints are served.
    pub static_dir: Option<PathBuf>,
    /// WebSocket broadcast channel capacity. Default: 256.
    pub broadcast_capacity: usize,
    /// Browser origins allowed to call the API besides the server's own,
    /// e.g. `chrome-extension://<id>`. Default: none.
    pub allowed_origins: Vec<HeaderValue>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            static_dir: None,
            broadcast_capacity: 256,
            allowed_origins: Vec::new(),
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// Store-change notifications from `handle` are relayed to every WebSocket
/// client. The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(handle: CoordinatorHandle, config: WebConfig) -> Result<SocketAddr, String> {
    let (broadcast_tx, _) = tokio::sync::broadcast::channel(config.broadcast_capacity.max(1));
    forward_store_events(&handle, broadcast_tx.clone());
    let router = server::build_router(
        handle,
        broadcast_tx,
        config.static_dir,
        AllowedOrigins::new(config.allowed_origins),
    );
    server::start_server(router, config.bind_addr).await
}
