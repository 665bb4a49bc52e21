use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::DocsConfig;
use crate::routing::RouteTable;

/// Where one backend publishes its OpenAPI document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSource {
    pub service: String,
    pub url: String,
    /// Public path prefix for this backend's operations, e.g. `/api/v1/cart`.
    pub prefix: String,
}

struct Cached {
    generated_at: Instant,
    document: Arc<Value>,
}

pub struct DocsAggregator {
    sources: Vec<DocSource>,
    config: DocsConfig,
    client: reqwest::Client,
    cache: Mutex<Option<Cached>>,
}

impl DocsAggregator {
    pub fn new(routes: &RouteTable, config: DocsConfig, client: reqwest::Client) -> Self {
        let sources = routes
            .backends()
            .into_iter()
            .map(|route| DocSource {
                service: route.name.clone(),
                url: format!("{}{}", route.base(), config.backend_path),
                prefix: format!("{}{}", routes.api_prefix(), route.path_prefix),
            })
            .collect();
        Self::with_sources(sources, config, client)
    }

    pub fn with_sources(sources: Vec<DocSource>, config: DocsConfig, client: reqwest::Client) -> Self {
        Self {
            sources,
            config,
            client,
            cache: Mutex::new(None),
        }
    }

    /// The merged document, regenerated when older than the cache TTL.
    pub async fn document(&self) -> Arc<Value> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        // Held across regeneration so concurrent callers wait for one fetch.
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.generated_at.elapsed() < ttl {
                return cached.document.clone();
            }
        }

        tracing::info!(sources = self.sources.len(), "Regenerating unified API documentation");
        let document = Arc::new(self.generate().await);
        *cache = Some(Cached {
            generated_at: Instant::now(),
            document: document.clone(),
        });
        document
    }

    async fn generate(&self) -> Value {
        let mut unified = base_document(&self.config.title);
        let fetches = self.sources.iter().map(|s| self.fetch(s));
        let specs = join_all(fetches).await;

        for (source, spec) in self.sources.iter().zip(specs) {
            if let Some(spec) = spec {
                merge_spec(&mut unified, &spec, &source.prefix);
                tracing::debug!(service = %source.service, "Merged service documentation");
            }
        }

        let endpoints = unified["paths"].as_object().map(|p| p.len()).unwrap_or(0);
        tracing::info!(endpoints, "Unified API documentation ready");
        unified
    }

    async fn fetch(&self, source: &DocSource) -> Option<Value> {
        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        let result = tokio::time::timeout(timeout, async {
            self.client
                .get(&source.url)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
        })
        .await;

        match result {
            Ok(Ok(spec)) => Some(spec),
            Ok(Err(e)) => {
                tracing::warn!(service = %source.service, error = %e, "Failed to fetch service docs");
                None
            }
            Err(_) => {
                tracing::warn!(service = %source.service, "Timed out fetching service docs");
                None
            }
        }
    }
}

pub fn base_document(title: &str) -> Value {
    json!({
        "openapi": "3.0.0",
        "info": {
            "title": title,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "components": {
            "securitySchemes": {
                "bearerAuth": {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT",
                },
                "ServiceToken": {
                    "type": "apiKey",
                    "in": "header",
                    "name": "X-Service-Token",
                },
            },
            "schemas": {},
        },
        "paths": {},
    })
}

/// Merge one backend document into `unified`.
///
/// Paths missing `prefix` get it prepended; methods on an existing path are
/// merged; component schemas are merged with later sources winning.
pub fn merge_spec(unified: &mut Value, spec: &Value, prefix: &str) {
    let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
        return;
    };
    let Some(root) = unified.as_object_mut() else {
        return;
    };

    if let Some(target_paths) = child_object(root, "paths") {
        for (path, operations) in paths {
            let full = if path.starts_with(prefix) {
                path.clone()
            } else {
                format!("{}{}", prefix, path)
            };
            match (target_paths.get_mut(&full), operations.as_object()) {
                (Some(Value::Object(existing)), Some(ops)) => {
                    for (method, op) in ops {
                        existing.insert(method.clone(), op.clone());
                    }
                }
                _ => {
                    target_paths.insert(full, operations.clone());
                }
            }
        }
    }

    let schemas = spec
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object);
    let target = child_object(root, "components").and_then(|c| child_object(c, "schemas"));
    if let (Some(schemas), Some(target)) = (schemas, target) {
        for (name, schema) in schemas {
            target.insert(name.clone(), schema.clone());
        }
    }
}

/// The object under `key`, replacing a missing or non-object value.
fn child_object<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
}
