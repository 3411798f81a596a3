//! Origin checks for browser callers.
//!
//! The coordinator holds the API key and the history, so only pages served by
//! this server and origins named in [`WebConfig::allowed_origins`](crate::WebConfig)
//! may call it. Requests without an `Origin` header come from non-browser
//! clients and pass through.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HOST, ORIGIN};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Origins trusted in addition to the server's own.
#[derive(Clone, Debug, Default)]
pub struct AllowedOrigins(Arc<Vec<HeaderValue>>);

impl AllowedOrigins {
    pub fn new(origins: Vec<HeaderValue>) -> Self {
        Self(Arc::new(origins))
    }

    /// Whether a request carrying `headers` may reach the coordinator.
    pub fn permits(&self, headers: &HeaderMap) -> bool {
        let Some(origin) = headers.get(ORIGIN) else {
            return true;
        };
        self.0.contains(origin) || is_same_origin(origin, headers.get(HOST))
    }

    /// CORS layer that only answers for the listed origins.
    pub fn cors_layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.0.iter().cloned()))
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    }
}

fn is_same_origin(origin: &HeaderValue, host: Option<&HeaderValue>) -> bool {
    let (Ok(origin), Some(Ok(host))) = (origin.to_str(), host.map(HeaderValue::to_str)) else {
        return false;
    };
    origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .is_some_and(|authority| authority.eq_ignore_ascii_case(host))
}

/// Middleware: reject requests from origins that are not trusted.
pub async fn require_trusted_origin(
    State(allowed): State<AllowedOrigins>,
    request: Request,
    next: Next,
) -> Response {
    if allowed.permits(request.headers()) {
        return next.run(request).await;
    }
    warn!(
        "Rejected {} {} from untrusted origin {:?}",
        request.method(),
        request.uri().path(),
        request.headers().get(ORIGIN)
    );
    (StatusCode::FORBIDDEN, "origin not allowed").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(origin: Option<&str>, host: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(HOST, HeaderValue::from_str(host).unwrap());
        if let Some(origin) = origin {
            map.insert(ORIGIN, HeaderValue::from_str(origin).unwrap());
        }
        map
    }

    #[test]
    fn no_origin_is_a_non_browser_client() {
        let allowed = AllowedOrigins::default();
        assert!(allowed.permits(&headers(None, "127.0.0.1:3001")));
    }

    #[test]
    fn same_origin_is_permitted() {
        let allowed = AllowedOrigins::default();
        assert!(allowed.permits(&headers(Some("http://127.0.0.1:3001"), "127.0.0.1:3001")));
        assert!(!allowed.permits(&headers(Some("http://127.0.0.1:4000"), "127.0.0.1:3001")));
    }

    #[test]
    fn foreign_origin_needs_listing() {
        let evil = headers(Some("https://evil.example"), "127.0.0.1:3001");
        let extension = headers(Some("chrome-extension://abc"), "127.0.0.1:3001");

        let allowed = AllowedOrigins::default();
        assert!(!allowed.permits(&evil));
        assert!(!allowed.permits(&extension));

        let allowed = AllowedOrigins::new(vec![HeaderValue::from_static("chrome-extension://abc")]);
        assert!(allowed.permits(&extension));
        assert!(!allowed.permits(&evil));
    }
}
