//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Resolve a request path to exactly one route or an explicit no-match
//! - Answer whether a path is public (skips authentication)
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix wins; ties keep declaration order (stable sort)
//! - O(n) path prefix scan (acceptable for typical route counts)

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::{GatewayConfig, QuotaClass, ServiceConfig};
use crate::routing::matcher::{PathPrefixMatcher, TemplateSet};

/// A resolved backend route.
#[derive(Debug, Clone)]
pub struct ServiceRoute {
    /// Backend name; shared by every route to the same backend.
    pub name: String,
    pub path_prefix: String,
    pub upstream_base_url: Url,
    pub request_timeout: Duration,
    pub health_check_enabled: bool,
    pub quota_class: QuotaClass,
}

impl ServiceRoute {
    fn from_config(config: &ServiceConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            name: config.name.clone(),
            path_prefix: config.path_prefix.clone(),
            upstream_base_url: Url::parse(&config.url)?,
            request_timeout: Duration::from_millis(config.timeout_ms),
            health_check_enabled: config.health_check,
            quota_class: config.quota_class,
        })
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn base(&self) -> &str {
        self.upstream_base_url.as_str().trim_end_matches('/')
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no route matches {path}")]
pub struct RouteNotFound {
    pub path: String,
}

#[derive(Debug, Error)]
#[error("route {name}: invalid upstream url: {source}")]
pub struct RouteBuildError {
    pub name: String,
    #[source]
    pub source: url::ParseError,
}

#[derive(Debug)]
struct CompiledRoute {
    matcher: PathPrefixMatcher,
    route: ServiceRoute,
}

/// A resolved route plus the path relative to the route prefix.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    pub route: &'a ServiceRoute,
    /// Path with the API prefix removed (e.g. `/catalog/products`).
    pub relative_path: &'a str,
    /// Path with API and route prefixes removed (e.g. `/products`).
    pub remainder: &'a str,
}

/// Static route table: path prefix → backend.
#[derive(Debug)]
pub struct RouteTable {
    api_prefix: String,
    routes: Vec<CompiledRoute>,
    public_paths: TemplateSet,
    strict_paths: TemplateSet,
}

impl RouteTable {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, RouteBuildError> {
        let mut routes = config
            .services
            .iter()
            .map(|svc| {
                ServiceRoute::from_config(svc)
                    .map(|route| CompiledRoute {
                        matcher: PathPrefixMatcher::new(svc.path_prefix.clone()),
                        route,
                    })
                    .map_err(|source| RouteBuildError {
                        name: svc.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Stable: equal-length prefixes keep declaration order.
        routes.sort_by(|a, b| b.matcher.prefix().len().cmp(&a.matcher.prefix().len()));

        tracing::debug!(routes = routes.len(), "Route table compiled");

        Ok(Self {
            api_prefix: config.api_prefix.clone(),
            routes,
            public_paths: TemplateSet::compile(&config.public_paths),
            strict_paths: TemplateSet::compile(&config.strict_paths),
        })
    }

    /// Strip the API version prefix; `None` if the path lacks it.
    pub fn strip_api_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.api_prefix.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix(self.api_prefix.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Resolve a full request path to its route.
    pub fn resolve<'a>(&'a self, path: &'a str) -> Result<RouteMatch<'a>, RouteNotFound> {
        let not_found = || RouteNotFound {
            path: path.to_string(),
        };
        let relative = self.strip_api_prefix(path).ok_or_else(not_found)?;
        self.routes
            .iter()
            .find(|r| r.matcher.matches(relative))
            .map(|r| RouteMatch {
                route: &r.route,
                relative_path: relative,
                remainder: r.matcher.remainder(relative),
            })
            .ok_or_else(not_found)
    }

    /// True if the full request path matches a public template.
    pub fn public_path_matches(&self, path: &str) -> bool {
        self.strip_api_prefix(path)
            .map(|rel| self.public_paths.matches(rel))
            .unwrap_or(false)
    }

    /// True if the API-relative path matches a strict-quota template.
    pub fn strict_path_matches(&self, relative_path: &str) -> bool {
        self.strict_paths.matches(relative_path)
    }

    /// All routes in match order.
    pub fn routes(&self) -> impl Iterator<Item = &ServiceRoute> {
        self.routes.iter().map(|r| &r.route)
    }

    /// One route per distinct backend name, sorted by name.
    pub fn backends(&self) -> Vec<&ServiceRoute> {
        let mut seen: Vec<&ServiceRoute> = Vec::new();
        let mut ordered: Vec<&CompiledRoute> = self.routes.iter().collect();
        ordered.sort_by_key(|r| r.route.name.clone());
        for r in ordered {
            if !seen.iter().any(|s| s.name == r.route.name) {
                seen.push(&r.route);
            }
        }
        seen
    }

    pub fn backend(&self, name: &str) -> Option<&ServiceRoute> {
        self.routes.iter().map(|r| &r.route).find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, prefix: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            path_prefix: prefix.into(),
            url: format!("http://{}.internal:8080", name),
            timeout_ms: 1000,
            health_check: false,
            quota_class: QuotaClass::Default,
        }
    }

    fn table(services: Vec<ServiceConfig>) -> RouteTable {
        let config = GatewayConfig {
            services,
            public_paths: vec!["/auth/refresh".into(), "/catalog/products/:id/image".into()],
            ..GatewayConfig::default()
        };
        RouteTable::from_config(&config).unwrap()
    }

    #[test]
    fn test_resolve_strips_api_prefix() {
        let table = table(vec![svc("catalog", "/catalog"), svc("cart", "/cart")]);

        let m = table.resolve("/api/v1/cart/items/3").unwrap();
        assert_eq!(m.route.name, "cart");
        assert_eq!(m.relative_path, "/cart/items/3");
        assert_eq!(m.remainder, "/items/3");

        assert!(table.resolve("/cart/items").is_err());
        assert!(table.resolve("/api/v1x/cart").is_err());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = table(vec![svc("catalog", "/catalog"), svc("imports", "/catalog/import")]);

        assert_eq!(table.resolve("/api/v1/catalog/import/x").unwrap().route.name, "imports");
        assert_eq!(table.resolve("/api/v1/catalog/items").unwrap().route.name, "catalog");
        assert_eq!(table.resolve("/api/v1/catalog/importer").unwrap().route.name, "catalog");
    }

    #[test]
    fn test_unknown_path_not_found() {
        let table = table(vec![svc("catalog", "/catalog")]);
        let err = table.resolve("/api/v1/unknown").unwrap_err();
        assert_eq!(err.path, "/api/v1/unknown");
    }

    #[test]
    fn test_public_paths() {
        let table = table(vec![svc("auth", "/auth"), svc("catalog", "/catalog")]);

        assert!(table.public_path_matches("/api/v1/auth/refresh"));
        assert!(table.public_path_matches("/api/v1/catalog/products/9/image"));
        assert!(!table.public_path_matches("/api/v1/catalog/products/9"));
        assert!(!table.public_path_matches("/auth/refresh"));
    }

    #[test]
    fn test_backends_deduplicated() {
        let table = table(vec![
            svc("merchant", "/merchant"),
            svc("merchant", "/device"),
            svc("cart", "/cart"),
        ]);
        let names: Vec<_> = table.backends().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["cart", "merchant"]);
    }
}
