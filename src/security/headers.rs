//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Strip client-supplied identity headers before forwarding
//! - Inject identity established by the auth guard
//! - Add security response headers
//! - Build the CORS layer
//!
//! # Design Decisions
//! - Never trust identity headers from the client; only the guard sets them
//! - Security headers are only added when the backend didn't set them

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};

use crate::security::auth::AuthenticatedUser;

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");
pub const X_MERCHANT_ID: HeaderName = HeaderName::from_static("x-merchant-id");
pub const X_SERVICE_TOKEN: HeaderName = HeaderName::from_static("x-service-token");

const IDENTITY_HEADERS: [HeaderName; 4] = [X_USER_ID, X_USER_ROLE, X_MERCHANT_ID, X_SERVICE_TOKEN];

/// Remove headers only the gateway may set.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in IDENTITY_HEADERS.iter() {
        headers.remove(name);
    }
}

/// Set `X-User-Id`, `X-User-Role` and `X-Merchant-Id` (empty when absent).
///
/// A value that is not a legal header value is omitted.
pub fn inject_identity(headers: &mut HeaderMap, user: &AuthenticatedUser) {
    let merchant = user.merchant_id.as_deref().unwrap_or("");
    for (name, value) in [
        (X_USER_ID, user.user_id.as_str()),
        (X_USER_ROLE, user.role.as_str()),
        (X_MERCHANT_ID, merchant),
    ] {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(_) => tracing::warn!(header = %name, "Identity value is not a valid header, omitting"),
        }
    }
}

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("x-dns-prefetch-control", "off"),
];

/// Add baseline security headers to responses that lack them.
pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        let name = HeaderName::from_static(name);
        if !headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }
    response
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .expose_headers([HeaderName::from_static("x-request-id")]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any).allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_headers(AllowHeaders::mirror_request())
}
