use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::Environment;
use crate::health::HealthReport;
use crate::http::server::AppState;
use crate::resilience::BreakerSnapshot;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub environment: Environment,
    pub uptime_secs: u64,
    pub routes: usize,
    pub backends: Vec<String>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        environment: state.config.environment,
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: state.routes.routes().count(),
        backends: state
            .routes
            .backends()
            .into_iter()
            .map(|r| r.name.clone())
            .collect(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers.snapshots())
}

pub async fn reset_breaker(State(state): State<AppState>, Path(service): Path<String>) -> Response {
    if state.breakers.reset(&service) {
        tracing::info!(service = %service, "Circuit breaker reset via admin API");
        Json(serde_json::json!({ "service": service, "reset": true })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "service": service, "error": "No breaker for service" })),
        )
            .into_response()
    }
}

pub async fn get_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.snapshot())
}
