//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Check upstream URLs and path prefixes are well formed
//! - Detect duplicate route prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, QuotaClass, StoreBackend};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }
    if !config.api_prefix.is_empty()
        && (!config.api_prefix.starts_with('/') || config.api_prefix.ends_with('/'))
    {
        errors.push(ValidationError::new(
            "api_prefix",
            "must start with '/' and not end with '/'",
        ));
    }

    if config.services.is_empty() {
        errors.push(ValidationError::new("services", "at least one service is required"));
    }

    let mut prefixes = HashSet::new();
    for (i, svc) in config.services.iter().enumerate() {
        let field = |name: &str| format!("services[{}].{}", i, name);
        if svc.name.trim().is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        }
        if !svc.path_prefix.starts_with('/') || (svc.path_prefix.len() > 1 && svc.path_prefix.ends_with('/')) {
            errors.push(ValidationError::new(
                field("path_prefix"),
                "must start with '/' and not end with '/'",
            ));
        }
        if !prefixes.insert(svc.path_prefix.as_str()) {
            errors.push(ValidationError::new(
                field("path_prefix"),
                format!("duplicate prefix {}", svc.path_prefix),
            ));
        }
        match Url::parse(&svc.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => errors.push(ValidationError::new(field("url"), "must be an http(s) URL")),
        }
        if svc.timeout_ms == 0 {
            errors.push(ValidationError::new(field("timeout_ms"), "must be > 0"));
        }
    }

    if !config.services.iter().any(|s| s.name == config.auth.service) {
        errors.push(ValidationError::new(
            "auth.service",
            format!("no service named {}", config.auth.service),
        ));
    }
    if config.auth.verify_timeout_ms == 0 {
        errors.push(ValidationError::new("auth.verify_timeout_ms", "must be > 0"));
    }

    for class in [QuotaClass::Default, QuotaClass::Strict, QuotaClass::Auth, QuotaClass::Payment] {
        let quota = config.rate_limit.quota(class);
        if quota.window_ms == 0 || quota.max_requests == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.{}", class),
                "window_ms and max_requests must be > 0",
            ));
        }
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be > 0"));
    }
    if config.circuit_breaker.recovery_successes == 0 {
        errors.push(ValidationError::new("circuit_breaker.recovery_successes", "must be > 0"));
    }

    if config.store.backend == StoreBackend::Redis && Url::parse(&config.store.redis_url).is_err() {
        errors.push(ValidationError::new("store.redis_url", "not a valid URL"));
    }
    if config.store.op_timeout_ms == 0 {
        errors.push(ValidationError::new("store.op_timeout_ms", "must be > 0"));
    }

    if config.security.service_secret.is_empty() {
        errors.push(ValidationError::new("security.service_secret", "must not be empty"));
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be > 0"));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = GatewayConfig::default();
        config.services[0].url = "ftp://nope".into();
        config.services[1].path_prefix = "catalog".into();
        config.circuit_breaker.failure_threshold = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"services[0].url"));
        assert!(fields.contains(&"services[1].path_prefix"));
        assert!(fields.contains(&"circuit_breaker.failure_threshold"));
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let mut config = GatewayConfig::default();
        let dup = config.services[4].clone();
        config.services.push(dup);
        assert!(validate_config(&config).is_err());
    }
}
