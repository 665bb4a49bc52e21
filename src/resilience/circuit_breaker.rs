//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: first call after the cooldown elapses
//! Half-Open → Closed: recovery_successes consecutive probe successes
//! Half-Open → Open: any probe failure (fresh cooldown)
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global), owned by a registry
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in flight while Half-Open (prevents hammering recovering backend)
//! - Outcomes are recorded through a permit, so a dropped request can't
//!   leave the probe slot taken

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Returned when a call is rejected without contacting the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit breaker is OPEN for {service}")]
pub struct CircuitOpenError {
    pub service: String,
    /// Time left before a probe is admitted (zero while a probe is in flight).
    pub retry_in: Duration,
}

/// What recording a failure did to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Counted; the breaker still admits calls.
    Recorded,
    /// The breaker is open (it just tripped or already was).
    Open,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_until: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_until: None,
            probe_in_flight: false,
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    /// Milliseconds until an open breaker admits a probe.
    pub retry_in_ms: Option<u64>,
}

/// One backend's breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    recovery_successes: u32,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_millis(config.cooldown_ms),
            recovery_successes: config.recovery_successes.max(1),
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask permission to call the backend.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, CircuitOpenError> {
        let now = Instant::now();
        let mut inner = self.lock();

        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let until = inner.opened_until.unwrap_or(now);
                if now < until {
                    return Err(CircuitOpenError {
                        service: self.name.clone(),
                        retry_in: until - now,
                    });
                }
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                inner.probe_in_flight = true;
                tracing::info!(service = %self.name, "Circuit breaker HALF_OPEN, admitting probe");
                metrics::record_breaker_transition(&self.name, CircuitState::HalfOpen);
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(CircuitOpenError {
                        service: self.name.clone(),
                        retry_in: Duration::ZERO,
                    });
                }
                inner.probe_in_flight = true;
                true
            }
        };

        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            probe,
            settled: false,
        })
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;

        if inner.state != CircuitState::HalfOpen {
            return;
        }
        if !probe {
            // A call admitted before the breaker opened says nothing about recovery.
            return;
        }

        inner.probe_in_flight = false;
        inner.consecutive_successes += 1;
        if inner.consecutive_successes >= self.recovery_successes {
            *inner = BreakerState::closed();
            tracing::info!(service = %self.name, "Circuit breaker CLOSED");
            metrics::record_breaker_transition(&self.name, CircuitState::Closed);
        }
    }

    fn on_failure(&self, probe: bool) -> FailureOutcome {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.consecutive_successes = 0;
        if probe {
            inner.probe_in_flight = false;
        }

        let trip = match inner.state {
            CircuitState::Open => return FailureOutcome::Open,
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.failure_threshold,
        };

        if !trip {
            return FailureOutcome::Recorded;
        }

        inner.state = CircuitState::Open;
        inner.opened_until = Some(now + self.cooldown);
        inner.probe_in_flight = false;
        tracing::error!(
            service = %self.name,
            failures = inner.consecutive_failures,
            cooldown_ms = self.cooldown.as_millis() as u64,
            "Circuit breaker OPEN"
        );
        metrics::record_breaker_transition(&self.name, CircuitState::Open);
        FailureOutcome::Open
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let inner = self.lock();
        let retry_in_ms = match (inner.state, inner.opened_until) {
            (CircuitState::Open, Some(until)) => {
                Some(until.saturating_duration_since(now).as_millis() as u64)
            }
            _ => None,
        };
        BreakerSnapshot {
            service: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            failure_threshold: self.failure_threshold,
            cooldown_ms: self.cooldown.as_millis() as u64,
            retry_in_ms,
        }
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&self) {
        *self.lock() = BreakerState::closed();
        tracing::info!(service = %self.name, "Circuit breaker reset");
    }
}

/// Permission to make one backend call.
///
/// Settle it with [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). Dropping it unsettled records
/// nothing but frees the half-open probe slot.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    settled: bool,
}

impl BreakerPermit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn record_failure(mut self) -> FailureOutcome {
        self.settled = true;
        self.breaker.on_failure(self.probe)
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

/// Process-wide set of breakers, one per backend, created on first use.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service) {
            return existing.clone();
        }
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(service, &self.config)))
            .clone()
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }

    /// Reset one breaker. Returns false if it was never created.
    pub fn reset(&self, service: &str) -> bool {
        match self.breakers.get(service) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "catalog",
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown_ms,
                recovery_successes: 3,
            },
        ))
    }

    fn fail(b: &Arc<CircuitBreaker>) -> FailureOutcome {
        b.try_acquire().unwrap().record_failure()
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_exactly_at_threshold() {
        let b = breaker(5, 10_000);
        for _ in 0..4 {
            assert_eq!(fail(&b), FailureOutcome::Recorded);
            assert_eq!(b.snapshot().state, CircuitState::Closed);
        }
        assert_eq!(fail(&b), FailureOutcome::Open);
        assert_eq!(b.snapshot().state, CircuitState::Open);

        let err = b.try_acquire().unwrap_err();
        assert_eq!(err.service, "catalog");
        assert_eq!(err.retry_in, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_streak() {
        let b = breaker(3, 1000);
        fail(&b);
        fail(&b);
        b.try_acquire().unwrap().record_success();
        fail(&b);
        fail(&b);
        assert_eq!(b.snapshot().state, CircuitState::Closed);
        assert_eq!(b.snapshot().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_until_cooldown_then_single_probe() {
        let b = breaker(1, 5000);
        fail(&b);

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert!(b.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        let probe = b.try_acquire().unwrap();
        assert!(probe.is_probe());
        assert_eq!(b.snapshot().state, CircuitState::HalfOpen);

        // Only one probe at a time.
        assert!(b.try_acquire().is_err());
        probe.record_success();
        assert!(b.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_probe_successes_close() {
        let b = breaker(1, 1000);
        fail(&b);
        tokio::time::advance(Duration::from_secs(1)).await;

        for i in 0..3 {
            let expected = if i == 0 {
                CircuitState::Open
            } else {
                CircuitState::HalfOpen
            };
            assert_eq!(b.snapshot().state, expected);
            b.try_acquire().unwrap().record_success();
        }
        assert_eq!(b.snapshot().state, CircuitState::Closed);
        let snap = b.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.consecutive_successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_cooldown() {
        let b = breaker(2, 1000);
        fail(&b);
        fail(&b);
        tokio::time::advance(Duration::from_secs(1)).await;

        b.try_acquire().unwrap().record_success();
        assert_eq!(fail(&b), FailureOutcome::Open);
        assert_eq!(b.snapshot().state, CircuitState::Open);
        assert_eq!(b.snapshot().retry_in_ms, Some(1000));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(b.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_frees_slot() {
        let b = breaker(1, 100);
        fail(&b);
        tokio::time::advance(Duration::from_millis(100)).await;

        drop(b.try_acquire().unwrap());
        assert_eq!(b.snapshot().state, CircuitState::HalfOpen);
        assert!(b.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_permit_does_not_close_half_open() {
        let b = breaker(1, 100);
        let stale = b.try_acquire().unwrap();
        fail(&b);
        tokio::time::advance(Duration::from_millis(100)).await;
        let probe = b.try_acquire().unwrap();

        stale.record_success();
        assert_eq!(b.snapshot().consecutive_successes, 0);
        probe.record_success();
        assert_eq!(b.snapshot().consecutive_successes, 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_trip_once() {
        let b = breaker(10, 60_000);
        let mut handles = Vec::new();
        for _ in 0..32 {
            let b = b.clone();
            handles.push(tokio::spawn(async move {
                match b.try_acquire() {
                    Ok(permit) => Some(permit.record_failure()),
                    Err(_) => None,
                }
            }));
        }
        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                admitted += 1;
            }
        }
        assert!(admitted >= 10);
        assert_eq!(b.snapshot().state, CircuitState::Open);
        assert_eq!(b.snapshot().consecutive_failures, admitted);
    }

    #[test]
    fn test_registry_creates_lazily_and_resets() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown_ms: 60_000,
            recovery_successes: 3,
        });
        assert!(registry.snapshots().is_empty());
        assert!(!registry.reset("cart"));

        let a = registry.get("cart");
        let b = registry.get("cart");
        assert!(Arc::ptr_eq(&a, &b));

        a.try_acquire().unwrap().record_failure();
        assert_eq!(registry.snapshots()[0].state, CircuitState::Open);

        assert!(registry.reset("cart"));
        assert_eq!(registry.get("cart").snapshot().state, CircuitState::Closed);
    }
}
