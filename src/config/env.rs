//! Environment variable overrides.
//!
//! Applied after the file is parsed and before validation, so a deployment
//! can ship one TOML file and vary URLs and secrets per environment.

use std::str::FromStr;

use crate::config::loader::ConfigError;
use crate::config::schema::{Environment, GatewayConfig, StoreBackend};

fn parse<T: FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Env {
        name: name.to_string(),
        value,
    })
}

/// Overlay `config` with values looked up through `lookup`.
///
/// `lookup` is injected so tests don't depend on the process environment.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for svc in config.services.iter_mut() {
        let name = format!("{}_SERVICE_URL", svc.name.to_uppercase().replace('-', "_"));
        if let Some(url) = lookup(&name) {
            svc.url = url;
        }
    }

    if let Some(port) = lookup("PORT") {
        let port: u16 = parse("PORT", port)?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    if let Some(env) = lookup("GATEWAY_ENV") {
        config.environment = match env.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
    }

    if let Some(url) = lookup("REDIS_URL") {
        config.store.backend = StoreBackend::Redis;
        config.store.redis_url = url;
    }

    if let Some(secret) = lookup("SERVICE_SECRET") {
        config.security.service_secret = secret;
    }

    if let Some(v) = lookup("CIRCUIT_BREAKER_THRESHOLD") {
        config.circuit_breaker.failure_threshold = parse("CIRCUIT_BREAKER_THRESHOLD", v)?;
    }
    if let Some(v) = lookup("CIRCUIT_BREAKER_COOLDOWN_MS") {
        config.circuit_breaker.cooldown_ms = parse("CIRCUIT_BREAKER_COOLDOWN_MS", v)?;
    }
    if let Some(v) = lookup("RATE_LIMIT_WINDOW_MS") {
        config.rate_limit.default.window_ms = parse("RATE_LIMIT_WINDOW_MS", v)?;
    }
    if let Some(v) = lookup("RATE_LIMIT_MAX_REQUESTS") {
        config.rate_limit.default.max_requests = parse("RATE_LIMIT_MAX_REQUESTS", v)?;
    }
    if let Some(v) = lookup("HEALTH_CHECK_INTERVAL_SECS") {
        config.health_check.interval_secs = parse("HEALTH_CHECK_INTERVAL_SECS", v)?;
    }
    if let Some(key) = lookup("ADMIN_API_KEY") {
        config.admin.api_key = key;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_service_urls_and_port() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            lookup_from(&[
                ("MERCHANT_SERVICE_URL", "http://merchant:80"),
                ("PORT", "8088"),
                ("GATEWAY_ENV", "production"),
            ]),
        )
        .unwrap();

        let merchant: Vec<_> = config.services.iter().filter(|s| s.name == "merchant").collect();
        assert_eq!(merchant.len(), 3);
        assert!(merchant.iter().all(|s| s.url == "http://merchant:80"));
        assert_eq!(config.listener.bind_address, "0.0.0.0:8088");
        assert_eq!(config.environment, Environment::Production);
    }

    #[test]
    fn test_redis_url_switches_backend() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(&mut config, lookup_from(&[("REDIS_URL", "redis://cache:6379")])).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redis);
    }

    #[test]
    fn test_bad_number_is_reported() {
        let mut config = GatewayConfig::default();
        let err = apply_env_overrides(
            &mut config,
            lookup_from(&[("CIRCUIT_BREAKER_THRESHOLD", "many")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }
}
