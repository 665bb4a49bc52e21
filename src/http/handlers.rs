//! Request handlers: the gateway pipeline plus health and docs endpoints.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::http::request::RequestIdExt;
use crate::http::response::{error_response, label, strip_hop_headers};
use crate::http::server::AppState;
use crate::proxy::ForwardContext;
use crate::security::rate_limit::{caller_key, quota_classes};

/// Gateway pipeline: route → authenticate → rate limit → forward.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request.request_id().to_string();
    let expose = state.config.expose_error_details();
    let path = request.uri().path().to_string();

    let matched = match state.routes.resolve(&path) {
        Ok(m) => m,
        Err(not_found) => {
            tracing::warn!(request_id = %request_id, path = %path, "No route matched");
            return error_response(
                GatewayError::RouteNotFound {
                    path: not_found.path,
                },
                &request_id,
                expose,
            );
        }
    };
    let service = matched.route.name.clone();

    let user = match state.auth.authenticate(&path, request.headers()).await {
        Ok(user) => user,
        Err(e) => {
            tracing::info!(request_id = %request_id, service = %service, error = %e, "Authentication rejected");
            return label(error_response(e, &request_id, expose), &service);
        }
    };

    if !state.limiter.is_exempt(matched.relative_path) {
        let classes = quota_classes(
            matched.route.quota_class,
            state.routes.strict_path_matches(matched.relative_path),
        );
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let caller = caller_key(user.as_ref(), peer);
        if let Err(e) = state.limiter.check_and_consume_all(&classes, &caller).await {
            return label(error_response(e, &request_id, expose), &service);
        }
    }

    let ctx = ForwardContext {
        request_id: &request_id,
        user: user.as_ref(),
    };
    match state.proxy.forward(&matched, request, ctx).await {
        Ok(mut response) => {
            strip_hop_headers(&mut response);
            label(response, &service)
        }
        Err(e) => error_response(e, &request_id, expose),
    }
}

/// `GET /health`: the gateway itself.
pub async fn gateway_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "api-gateway",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /health/all`: on-demand check of every backend.
pub async fn all_health(State(state): State<AppState>) -> Response {
    let report = state.health.check_all_now(state.gateway_port).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

/// `GET /health/{service}`: relay one backend's own health endpoint.
pub async fn service_health(State(state): State<AppState>, Path(service): Path<String>) -> Response {
    let Some(target) = state.health.target(&service) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "unknown",
                "service": service,
                "error": "Unknown service",
            })),
        )
            .into_response();
    };

    let timeout = std::time::Duration::from_millis(state.config.health_check.on_demand_timeout_ms);
    let outcome = tokio::time::timeout(timeout, async {
        let response = state.health.client().get(&target.url).send().await?;
        let status = response.status();
        let body = response.json::<Value>().await.ok();
        Ok::<_, reqwest::Error>((status, body))
    })
    .await;

    let error = match outcome {
        Ok(Ok((status, body))) if status.is_success() => {
            let body = body.unwrap_or_else(|| json!({ "status": "healthy" }));
            return (StatusCode::OK, Json(body)).into_response();
        }
        Ok(Ok((status, _))) => format!("health endpoint returned {}", status),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {}ms", timeout.as_millis()),
    };

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "unhealthy",
            "service": service,
            "error": error,
        })),
    )
        .into_response()
}

/// `GET /api-docs-json`: merged OpenAPI document.
pub async fn api_docs(State(state): State<AppState>) -> Json<Value> {
    let document = state.docs.document().await;
    Json(document.as_ref().clone())
}
