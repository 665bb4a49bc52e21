//! Client-visible error taxonomy.
//!
//! Every failure that ends a request is a [`GatewayError`]; rendering to an
//! HTTP response happens in exactly one place, [`GatewayError::into_response_for`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("no bearer token on a protected route")]
    NoToken,

    #[error("token rejected by the auth backend")]
    InvalidToken,

    #[error("auth backend did not answer in time")]
    AuthBackendTimeout,

    #[error("auth backend call failed: {0}")]
    AuthBackendError(String),

    #[error("quota `{class}` exhausted")]
    RateLimitExceeded { class: String },

    #[error("no route for {path}")]
    RouteNotFound { path: String },

    /// Breaker rejected the call; the backend was not contacted.
    #[error("circuit breaker is OPEN for {service}")]
    CircuitOpen { service: String },

    /// The call failed and its failure left the breaker open.
    #[error("{service} call failed and opened its circuit breaker: {detail}")]
    CircuitTripped { service: String, detail: String },

    #[error("{service} refused the connection: {detail}")]
    UpstreamUnavailable { service: String, detail: String },

    #[error("{service} did not respond in time")]
    UpstreamTimeout { service: String },

    #[error("{service} call failed: {detail}")]
    UpstreamFailure { service: String, detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    success: bool,
    error: &'static str,
    request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoToken
            | GatewayError::InvalidToken
            | GatewayError::AuthBackendTimeout
            | GatewayError::AuthBackendError(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::CircuitOpen { .. }
            | GatewayError::CircuitTripped { .. }
            | GatewayError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamFailure { .. } | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The constant, client-facing message.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::NoToken => "No token provided",
            GatewayError::InvalidToken => "Invalid token",
            GatewayError::AuthBackendTimeout | GatewayError::AuthBackendError(_) => {
                "Authentication failed"
            }
            GatewayError::RateLimitExceeded { .. } => "Too many requests, please try again later",
            GatewayError::RouteNotFound { .. } => "Route not found",
            GatewayError::CircuitOpen { .. } | GatewayError::CircuitTripped { .. } => {
                "Service temporarily unavailable"
            }
            GatewayError::UpstreamUnavailable { .. } => "Service unavailable",
            GatewayError::UpstreamTimeout { .. } => "Service request timeout",
            GatewayError::UpstreamFailure { .. } => "Service error",
            GatewayError::Internal(_) => "Internal server error",
        }
    }

    pub fn service(&self) -> Option<&str> {
        match self {
            GatewayError::CircuitOpen { service }
            | GatewayError::CircuitTripped { service, .. }
            | GatewayError::UpstreamUnavailable { service, .. }
            | GatewayError::UpstreamTimeout { service }
            | GatewayError::UpstreamFailure { service, .. } => Some(service),
            _ => None,
        }
    }

    /// Render as a JSON response. `expose_details` adds the internal error
    /// text and must be false in production.
    pub fn into_response_for(self, request_id: &str, expose_details: bool) -> Response {
        let path = match &self {
            GatewayError::RouteNotFound { path } => Some(path.as_str()),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            error: self.public_message(),
            request_id,
            service: self.service(),
            path,
            details: expose_details.then(|| self.to_string()),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: GatewayError, expose: bool) -> (StatusCode, serde_json::Value) {
        let response = err.into_response_for("req-1", expose);
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_echoes_path() {
        let (status, body) = render(
            GatewayError::RouteNotFound {
                path: "/api/v1/unknown".into(),
            },
            false,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found");
        assert_eq!(body["path"], "/api/v1/unknown");
        assert_eq!(body["requestId"], "req-1");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_network_errors_carry_service() {
        let (status, body) = render(
            GatewayError::UpstreamTimeout {
                service: "reporting".into(),
            },
            false,
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["service"], "reporting");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_details_only_when_exposed() {
        let err = GatewayError::UpstreamFailure {
            service: "cart".into(),
            detail: "connection reset".into(),
        };
        let (_, hidden) = render(err.clone(), false).await;
        assert!(hidden.get("details").is_none());

        let (status, shown) = render(err, true).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(shown["error"], "Service error");
        assert!(shown["details"].as_str().unwrap().contains("connection reset"));
    }

    #[test]
    fn test_auth_errors_are_401() {
        for err in [
            GatewayError::NoToken,
            GatewayError::InvalidToken,
            GatewayError::AuthBackendTimeout,
            GatewayError::AuthBackendError("boom".into()),
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(GatewayError::AuthBackendTimeout.public_message(), "Authentication failed");
    }
}
