//! Fixed-window rate limiting with quota classes.
//!
//! Counters live in the shared store under
//! `rl:<class>:<caller>:<window_start_ms>` with a TTL of one window, so all
//! gateway instances sharing a store share one window per caller.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{QuotaClass, RateLimitConfig};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::auth::AuthenticatedUser;
use crate::store::SharedStore;

/// Wall-clock milliseconds. Injectable so window boundaries are testable.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    })
}

/// Counter key for `caller`: the user id when authenticated, else the peer IP.
pub fn caller_key(user: Option<&AuthenticatedUser>, peer: Option<SocketAddr>) -> String {
    match (user, peer) {
        (Some(user), _) => user.user_id.clone(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Quota classes charged for one request: the route's own class, plus
/// `strict` when the path matches a strict template. Strict paths stay bound
/// by their route's quota as well.
pub fn quota_classes(route_class: QuotaClass, strict: bool) -> Vec<QuotaClass> {
    let mut classes = vec![route_class];
    if strict && route_class != QuotaClass::Strict {
        classes.push(QuotaClass::Strict);
    }
    classes
}

pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn SharedStore>,
    clock: Clock,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn SharedStore>) -> Self {
        Self::with_clock(config, store, system_clock())
    }

    pub fn with_clock(config: RateLimitConfig, store: Arc<dyn SharedStore>, clock: Clock) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    /// Paths that never count against a quota.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.config.exempt_paths.iter().any(|p| p == path)
    }

    /// Count one request for `caller` in `class`; reject past the ceiling.
    ///
    /// A store failure lets the request through.
    pub async fn check_and_consume(&self, class: QuotaClass, caller: &str) -> Result<(), GatewayError> {
        if !self.config.enabled {
            return Ok(());
        }

        let quota = self.config.quota(class);
        let window_ms = quota.window_ms.max(1);
        let window_start = (self.clock)() / window_ms * window_ms;
        let key = format!("rl:{}:{}:{}", class, caller, window_start);

        let count = match self
            .store
            .increment_with_ttl(&key, Duration::from_millis(window_ms))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, class = %class, "Rate limit store unavailable, allowing request");
                return Ok(());
            }
        };

        if count > quota.max_requests {
            tracing::warn!(
                caller = %caller,
                class = %class,
                count,
                limit = quota.max_requests,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(class.as_str());
            return Err(GatewayError::RateLimitExceeded {
                class: class.to_string(),
            });
        }
        Ok(())
    }

    /// Charge each class in order; the first exhausted one rejects.
    pub async fn check_and_consume_all(
        &self,
        classes: &[QuotaClass],
        caller: &str,
    ) -> Result<(), GatewayError> {
        for class in classes {
            self.check_and_consume(*class, caller).await?;
        }
        Ok(())
    }
}
