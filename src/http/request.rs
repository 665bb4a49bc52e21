//! Request identification and logging.
//!
//! # Responsibilities
//! - Expose the request ID assigned by the request-id layer
//! - Log every request and response, warn on slow ones
//! - Record request metrics once per request
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing (outermost layers)
//! - Handlers tag responses with the backend they touched so logs and
//!   metrics are labelled without re-resolving the route

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::http::response::ServiceLabel;
use crate::observability::metrics;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Access to the request ID set by `SetRequestIdLayer`.
pub trait RequestIdExt {
    /// The request ID, or `"unknown"` if none was assigned.
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> &str {
        self.headers().request_id()
    }
}

/// Settings for [`request_logging_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct RequestLogConfig {
    pub slow_request: Duration,
}

pub async fn request_logging_middleware(
    State(config): State<RequestLogConfig>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = request.request_id().to_string();
    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        url = %uri,
        ip = %peer,
        user_agent = %user_agent,
        "Request"
    );

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    let service = response
        .extensions()
        .get::<ServiceLabel>()
        .map(|s| s.0.as_str())
        .unwrap_or("gateway");

    tracing::info!(
        request_id = %request_id,
        method = %method,
        url = %uri,
        status,
        service = %service,
        duration_ms = elapsed.as_millis() as u64,
        "Response"
    );

    if elapsed > config.slow_request {
        tracing::warn!(
            request_id = %request_id,
            url = %uri,
            duration_ms = elapsed.as_millis() as u64,
            "Slow request"
        );
    }

    metrics::record_request(&method, status, service, start);
    response
}
