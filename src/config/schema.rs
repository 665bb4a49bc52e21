//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Deployment environment. Error details are hidden in production.
    pub environment: Environment,

    /// Version prefix stripped before route matching.
    pub api_prefix: String,

    /// Backend services and the path prefixes routed to them.
    pub services: Vec<ServiceConfig>,

    /// Path templates that skip authentication (relative to `api_prefix`).
    pub public_paths: Vec<String>,

    /// Path templates that use the `strict` quota class.
    pub strict_paths: Vec<String>,

    /// Authentication guard settings.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker defaults applied to every backend.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Shared store backing the identity cache and rate counters.
    pub store: StoreConfig,

    /// Security settings (service tokens, headers, CORS).
    pub security: SecurityConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Unified API documentation settings.
    pub docs: DocsConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            environment: Environment::default(),
            api_prefix: "/api/v1".to_string(),
            services: default_services(),
            public_paths: [
                "/auth/fallback/otp/send",
                "/auth/fallback/otp/verify",
                "/auth/bootstrap/device",
                "/auth/refresh",
                "/auth/verify",
                "/webhook/talus/onboarding",
                "/health",
                "/metrics",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            strict_paths: ["/payment/process", "/payment/refund", "/auth/pin/verify"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            store: StoreConfig::default(),
            security: SecurityConfig::default(),
            health_check: HealthCheckConfig::default(),
            docs: DocsConfig::default(),
            admin: AdminConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Whether error responses may carry internal details.
    pub fn expose_error_details(&self) -> bool {
        self.environment != Environment::Production
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Upper bound on total request handling time in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Quota class a route is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuotaClass {
    #[default]
    Default,
    Strict,
    Auth,
    Payment,
}

impl QuotaClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaClass::Default => "default",
            QuotaClass::Strict => "strict",
            QuotaClass::Auth => "auth",
            QuotaClass::Payment => "payment",
        }
    }
}

impl std::fmt::Display for QuotaClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend service and one path prefix routed to it.
///
/// Several entries may share a `name` (e.g. merchant serves `/merchant`,
/// `/device` and `/webhook`); they then share one circuit breaker and one
/// health snapshot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Backend identifier used for breakers, health and logs.
    pub name: String,

    /// Path prefix relative to `api_prefix` (e.g. "/catalog").
    pub path_prefix: String,

    /// Upstream base URL (e.g. "http://localhost:3003").
    pub url: String,

    /// Per-request upstream timeout in milliseconds.
    #[serde(default = "default_service_timeout")]
    pub timeout_ms: u64,

    /// Poll this backend from the background health monitor.
    #[serde(default)]
    pub health_check: bool,

    /// Quota class charged for requests on this route.
    #[serde(default)]
    pub quota_class: QuotaClass,
}

fn default_service_timeout() -> u64 {
    5000
}

fn service(
    name: &str,
    prefix: &str,
    port: u16,
    timeout_ms: u64,
    health_check: bool,
    quota_class: QuotaClass,
) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        path_prefix: prefix.to_string(),
        url: format!("http://localhost:{}", port),
        timeout_ms,
        health_check,
        quota_class,
    }
}

fn default_services() -> Vec<ServiceConfig> {
    vec![
        service("auth", "/auth", 3001, 5000, true, QuotaClass::Auth),
        service("merchant", "/merchant", 3002, 5000, true, QuotaClass::Default),
        service("merchant", "/device", 3002, 5000, true, QuotaClass::Default),
        service("merchant", "/webhook", 3002, 5000, true, QuotaClass::Default),
        service("catalog", "/catalog", 3003, 5000, false, QuotaClass::Default),
        service("cart", "/cart", 3004, 5000, false, QuotaClass::Default),
        service("payment", "/payment", 3005, 5000, false, QuotaClass::Payment),
        service("reporting", "/reports", 3006, 10000, false, QuotaClass::Default),
    ]
}

/// Authentication guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the service that verifies tokens.
    pub service: String,

    /// Verification path on the auth backend.
    pub verify_path: String,

    /// Verification call timeout in milliseconds.
    pub verify_timeout_ms: u64,

    /// Lifetime of a cached identity in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            service: "auth".to_string(),
            verify_path: "/api/v1/auth/verify".to_string(),
            verify_timeout_ms: 2000,
            cache_ttl_secs: 300,
        }
    }
}

/// Window and ceiling for one quota class.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct QuotaConfig {
    pub window_ms: u64,
    pub max_requests: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    pub default: QuotaConfig,
    pub strict: QuotaConfig,
    pub auth: QuotaConfig,
    pub payment: QuotaConfig,

    /// Paths (relative to `api_prefix`) that bypass the limiter.
    pub exempt_paths: Vec<String>,
}

impl RateLimitConfig {
    pub fn quota(&self, class: QuotaClass) -> QuotaConfig {
        match class {
            QuotaClass::Default => self.default,
            QuotaClass::Strict => self.strict,
            QuotaClass::Auth => self.auth,
            QuotaClass::Payment => self.payment,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: QuotaConfig {
                window_ms: 15 * 60 * 1000,
                max_requests: 100,
            },
            strict: QuotaConfig {
                window_ms: 60_000,
                max_requests: 10,
            },
            auth: QuotaConfig {
                window_ms: 300_000,
                max_requests: 20,
            },
            payment: QuotaConfig {
                window_ms: 60_000,
                max_requests: 5,
            },
            exempt_paths: vec!["/health".to_string(), "/metrics".to_string()],
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long an open circuit rejects calls, in milliseconds.
    pub cooldown_ms: u64,

    /// Consecutive half-open successes that close the circuit.
    pub recovery_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
            recovery_successes: 3,
        }
    }
}

/// Which shared store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// Shared store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis connection URL (redis backend only).
    pub redis_url: String,

    /// Prefix applied to every key. Empty by default: keys are
    /// `token:<raw>` and `rl:...`.
    pub key_prefix: String,

    /// Timeout for a single store operation in milliseconds.
    pub op_timeout_ms: u64,

    /// Expired-entry sweep interval for the memory backend, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
            op_timeout_ms: 500,
            sweep_interval_secs: 60,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Secret used to sign service-to-service tokens.
    pub service_secret: String,

    /// Lifetime of a service token in seconds.
    pub service_token_ttl_secs: u64,

    /// Enable security headers.
    pub enable_headers: bool,

    /// CORS origins; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            service_secret: "service-secret".to_string(),
            service_token_ttl_secs: 300,
            enable_headers: true,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background health monitor.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Background probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Probe timeout for on-demand aggregation in milliseconds.
    pub on_demand_timeout_ms: u64,

    /// Path to probe on each backend.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_ms: 3000,
            on_demand_timeout_ms: 2000,
            path: "/health".to_string(),
        }
    }
}

/// Unified documentation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocsConfig {
    pub enabled: bool,

    /// Path serving the OpenAPI document on each backend.
    pub backend_path: String,

    pub cache_ttl_secs: u64,

    pub fetch_timeout_ms: u64,

    pub title: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend_path: "/api-docs-json".to_string(),
            cache_ttl_secs: 60,
            fetch_timeout_ms: 5000,
            title: "Unified API".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:3100".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Requests slower than this are logged at warn level.
    pub slow_request_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            slow_request_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_backends() {
        let config = GatewayConfig::default();
        let mut names: Vec<_> = config.services.iter().map(|s| s.name.as_str()).collect();
        names.dedup();
        assert_eq!(
            names,
            vec!["auth", "merchant", "catalog", "cart", "payment", "reporting"]
        );
        assert_eq!(config.rate_limit.quota(QuotaClass::Payment).max_requests, 5);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.store.key_prefix, "");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            environment = "production"

            [rate_limit.strict]
            window_ms = 1000
            max_requests = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert!(!config.expose_error_details());
        assert_eq!(config.rate_limit.strict.max_requests, 2);
        assert_eq!(config.rate_limit.auth.max_requests, 20);
        assert_eq!(config.api_prefix, "/api/v1");
    }
}
