//! REST API endpoint handlers.
//!
//! `POST /api/message` is the request/response protocol over HTTP: one
//! [`Request`] in, one [`Response`] out. Typed failures are still HTTP 200;
//! the `status` field carries success or failure. Bodies that are not a
//! known request kind are rejected by the `Json` extractor before the
//! coordinator sees them.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use explainx::coordinator::CoordinatorHandle;
use explainx::error::Failure;
use explainx::protocol::{Request, Response};
use explainx::record::SummaryRecord;
use tracing::debug;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub handle: CoordinatorHandle,
}

/// POST /api/message: forward one request to the coordinator.
pub async fn post_message(
    State(app): State<AppState>,
    Json(request): Json<Request>,
) -> Json<Response> {
    debug!("HTTP request: {}", request.kind());
    Json(app.handle.request(request).await)
}

/// GET /api/summaries: the history, newest first.
///
/// Returns the bare array for the history viewer. Failures carry the
/// [`Failure`] as the body: 503 when the coordinator is gone, 500 otherwise.
pub async fn get_summaries(
    State(app): State<AppState>,
) -> Result<Json<Vec<SummaryRecord>>, (StatusCode, Json<Failure>)> {
    app.handle
        .get_summaries()
        .await
        .map(Json)
        .map_err(|failure| {
            let status = match failure {
                Failure::Unavailable { .. } | Failure::TimedOut { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(failure))
        })
}
