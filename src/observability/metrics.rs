//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, limiter, cache, breakers)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency by service
//! - `gateway_rate_limited_total` (counter): rejections by quota class
//! - `gateway_auth_cache_total` (counter): identity cache hit/miss
//! - `gateway_circuit_transitions_total` (counter): breaker transitions
//! - `gateway_backend_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; with no recorder
//!   installed every call is a no-op, so tests need no setup
//! - Exporter listens on its own port, outside the request pipeline

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::resilience::CircuitState;

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("service", service.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(class: &str) {
    metrics::counter!("gateway_rate_limited_total", "class" => class.to_string()).increment(1);
}

pub fn record_auth_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("gateway_auth_cache_total", "result" => result).increment(1);
}

pub fn record_breaker_transition(service: &str, state: CircuitState) {
    metrics::counter!(
        "gateway_circuit_transitions_total",
        "service" => service.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
}

pub fn record_backend_health(service: &str, healthy: bool) {
    metrics::gauge!("gateway_backend_health", "service" => service.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
