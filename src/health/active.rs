//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe health-checked backends
//! - Serve on-demand parallel checks of every backend
//! - Update backend health snapshots based on results

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::state::{HealthReport, HealthSnapshot, HealthState, HealthStatus};
use crate::observability::metrics;
use crate::routing::RouteTable;

/// A backend health endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTarget {
    pub service: String,
    pub url: String,
    pub port: Option<u16>,
    /// Polled by the background loop.
    pub background: bool,
}

pub struct HealthMonitor {
    targets: Vec<HealthTarget>,
    config: HealthCheckConfig,
    client: reqwest::Client,
    state: Arc<HealthState>,
}

impl HealthMonitor {
    pub fn new(routes: &RouteTable, config: HealthCheckConfig, client: reqwest::Client) -> Self {
        let targets: Vec<HealthTarget> = routes
            .backends()
            .into_iter()
            .map(|route| HealthTarget {
                service: route.name.clone(),
                url: format!("{}{}", route.base(), config.path),
                port: route.upstream_base_url.port_or_known_default(),
                background: route.health_check_enabled,
            })
            .collect();

        let state = Arc::new(HealthState::new());
        for t in targets.iter().filter(|t| t.background) {
            state.track(&t.service, t.port);
        }

        Self {
            targets,
            config,
            client,
            state,
        }
    }

    pub fn target(&self, service: &str) -> Option<&HealthTarget> {
        self.targets.iter().find(|t| t.service == service)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Latest background snapshot.
    pub fn snapshot(&self) -> HealthReport {
        self.state.report()
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            backends = self.targets.iter().filter(|t| t.background).count(),
            "Health monitor starting"
        );

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_round().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One background round over the polled backends.
    pub async fn check_round(&self) {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let probes = self
            .targets
            .iter()
            .filter(|t| t.background)
            .map(|t| probe(&self.client, t, timeout));

        for snapshot in join_all(probes).await {
            metrics::record_backend_health(&snapshot.service, snapshot.available);
            self.state.record(snapshot);
        }
    }

    /// Probe every backend now, with the on-demand timeout.
    ///
    /// Includes a `gateway` self entry. Does not touch background snapshots.
    pub async fn check_all_now(&self, gateway_port: Option<u16>) -> HealthReport {
        let timeout = Duration::from_millis(self.config.on_demand_timeout_ms);
        let probes = self.targets.iter().map(|t| probe(&self.client, t, timeout));
        let mut services = join_all(probes).await;

        services.push(HealthSnapshot {
            status: HealthStatus::Healthy,
            available: true,
            last_checked_at: Some(Utc::now()),
            ..HealthSnapshot::unknown("gateway", gateway_port)
        });
        HealthReport::new(services)
    }
}

/// Probe one health endpoint. Never fails; failures become unhealthy snapshots.
///
/// A 2xx JSON body carrying `status` decides health by that field; any other
/// 2xx is healthy.
pub async fn probe(client: &reqwest::Client, target: &HealthTarget, timeout: Duration) -> HealthSnapshot {
    let start = Instant::now();
    let mut snapshot = HealthSnapshot {
        last_checked_at: Some(Utc::now()),
        ..HealthSnapshot::unknown(target.service.clone(), target.port)
    };

    let outcome = time::timeout(timeout, async {
        let response = client
            .get(&target.url)
            .header("user-agent", "edge-gateway-health-check")
            .send()
            .await?;
        let status = response.status();
        let body = response.json::<serde_json::Value>().await.ok();
        Ok::<_, reqwest::Error>((status, body))
    })
    .await;

    snapshot.latency_ms = Some(start.elapsed().as_millis() as u64);

    match outcome {
        Ok(Ok((status, body))) if status.is_success() => {
            let body = body.unwrap_or(serde_json::Value::Null);
            snapshot.uptime = body.get("uptime").cloned();
            match body.get("status").and_then(|s| s.as_str()) {
                Some("healthy") | None => snapshot.status = HealthStatus::Healthy,
                Some(other) => {
                    snapshot.status = HealthStatus::Unhealthy;
                    snapshot.error = Some(format!("reported status {}", other));
                }
            }
        }
        Ok(Ok((status, _))) => {
            snapshot.status = HealthStatus::Unhealthy;
            snapshot.error = Some(format!("health endpoint returned {}", status));
        }
        Ok(Err(e)) => {
            snapshot.status = HealthStatus::Unhealthy;
            snapshot.error = Some(e.to_string());
        }
        Err(_) => {
            snapshot.status = HealthStatus::Unhealthy;
            snapshot.error = Some(format!("timed out after {}ms", timeout.as_millis()));
        }
    }

    snapshot.available = snapshot.status == HealthStatus::Healthy;
    if !snapshot.available {
        tracing::warn!(
            service = %target.service,
            error = snapshot.error.as_deref().unwrap_or(""),
            "Health check failed"
        );
    }
    snapshot
}
