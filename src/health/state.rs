//! Per-backend health snapshots.
//!
//! # States
//! - Unknown: not yet checked
//! - Healthy: last probe succeeded
//! - Unhealthy: last probe failed
//!
//! # Design Decisions
//! - Latest probe wins; no hysteresis, the breaker handles flapping traffic
//! - Unknown backends don't count against the overall status

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub service: String,
    pub status: HealthStatus,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthSnapshot {
    pub fn unknown(service: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            service: service.into(),
            status: HealthStatus::Unknown,
            available: false,
            port,
            last_checked_at: None,
            latency_ms: None,
            uptime: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: OverallStatus,
    pub services: Vec<HealthSnapshot>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(mut services: Vec<HealthSnapshot>) -> Self {
        services.sort_by(|a, b| a.service.cmp(&b.service));
        Self {
            status: overall(&services),
            services,
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == OverallStatus::Healthy
    }
}

/// Healthy iff every checked backend's latest snapshot is healthy.
pub fn overall(snapshots: &[HealthSnapshot]) -> OverallStatus {
    let all_healthy = snapshots
        .iter()
        .filter(|s| s.status != HealthStatus::Unknown)
        .all(|s| s.status == HealthStatus::Healthy);
    if all_healthy {
        OverallStatus::Healthy
    } else {
        OverallStatus::Degraded
    }
}

/// Latest background snapshot per backend.
#[derive(Debug, Default)]
pub struct HealthState {
    snapshots: DashMap<String, HealthSnapshot>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend as not yet checked.
    pub fn track(&self, service: &str, port: Option<u16>) {
        self.snapshots
            .entry(service.to_string())
            .or_insert_with(|| HealthSnapshot::unknown(service, port));
    }

    pub fn record(&self, snapshot: HealthSnapshot) {
        if let Some(previous) = self.snapshots.get(&snapshot.service) {
            if previous.status != snapshot.status && previous.status != HealthStatus::Unknown {
                tracing::info!(
                    service = %snapshot.service,
                    from = ?previous.status,
                    to = ?snapshot.status,
                    "Backend health changed"
                );
            }
        }
        self.snapshots.insert(snapshot.service.clone(), snapshot);
    }

    pub fn report(&self) -> HealthReport {
        HealthReport::new(self.snapshots.iter().map(|s| s.clone()).collect())
    }
}
