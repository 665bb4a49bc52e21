//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build every subsystem from the validated config (`AppState`)
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, logging, CORS, limits)
//! - Bind server to listener, spawn the health monitor
//! - Drain gracefully on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    middleware,
    routing::{any, get},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::docs::DocsAggregator;
use crate::health::HealthMonitor;
use crate::http::handlers::{all_health, api_docs, gateway_health, proxy_handler, service_health};
use crate::http::request::{request_logging_middleware, RequestLogConfig};
use crate::lifecycle::Shutdown;
use crate::proxy::ProxyEngine;
use crate::resilience::CircuitBreakerRegistry;
use crate::routing::{RouteBuildError, RouteTable};
use crate::security::headers::{cors_layer, security_headers_middleware};
use crate::security::{AuthGuard, HttpTokenVerifier, RateLimiter, ServiceTokenIssuer, TokenVerifier};
use crate::store::SharedStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Routes(#[from] RouteBuildError),
    #[error("auth service `{0}` has no configured route")]
    MissingAuthService(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub routes: Arc<RouteTable>,
    pub auth: Arc<AuthGuard>,
    pub limiter: Arc<RateLimiter>,
    pub proxy: Arc<ProxyEngine>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub health: Arc<HealthMonitor>,
    pub docs: Arc<DocsAggregator>,
    pub gateway_port: Option<u16>,
    pub started_at: Instant,
}

impl AppState {
    /// Build the pipeline, verifying tokens against the configured auth backend.
    pub fn new(config: GatewayConfig, store: Arc<dyn SharedStore>) -> Result<Self, StartupError> {
        let routes = RouteTable::from_config(&config)?;
        let auth_route = routes
            .backend(&config.auth.service)
            .ok_or_else(|| StartupError::MissingAuthService(config.auth.service.clone()))?;
        let verifier = HttpTokenVerifier::new(
            reqwest::Client::builder().build()?,
            format!("{}{}", auth_route.base(), config.auth.verify_path),
            Duration::from_millis(config.auth.verify_timeout_ms),
        );
        Self::with_verifier(config, store, Arc::new(verifier))
    }

    /// Build the pipeline with a caller-supplied token verifier.
    pub fn with_verifier(
        config: GatewayConfig,
        store: Arc<dyn SharedStore>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Result<Self, StartupError> {
        let routes = Arc::new(RouteTable::from_config(&config)?);
        let client = reqwest::Client::builder().build()?;

        let auth = Arc::new(AuthGuard::new(
            routes.clone(),
            store.clone(),
            verifier,
            Duration::from_secs(config.auth.cache_ttl_secs),
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), store));
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone()));
        let proxy = Arc::new(ProxyEngine::new(
            breakers.clone(),
            ServiceTokenIssuer::from_config(&config.security),
            config.api_prefix.clone(),
        ));
        let health = Arc::new(HealthMonitor::new(
            &routes,
            config.health_check.clone(),
            client.clone(),
        ));
        let docs = Arc::new(DocsAggregator::new(&routes, config.docs.clone(), client));
        let gateway_port = config
            .listener
            .bind_address
            .parse::<SocketAddr>()
            .ok()
            .map(|a| a.port());

        Ok(Self {
            config: Arc::new(config),
            routes,
            auth,
            limiter,
            proxy,
            breakers,
            health,
            docs,
            gateway_port,
            started_at: Instant::now(),
        })
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let mut router = Router::new()
            .route("/health", get(gateway_health))
            .route("/health/all", get(all_health))
            .route("/health/{service}", get(service_health));
        if config.docs.enabled {
            router = router.route("/api-docs-json", get(api_docs));
        }
        let mut router = router
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            // Outside the ServiceBuilder stack: it changes the response body type.
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn_with_state(
                        RequestLogConfig {
                            slow_request: Duration::from_millis(config.observability.slow_request_ms),
                        },
                        request_logging_middleware,
                    ))
                    .layer(cors_layer(&config.security.allowed_origins))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.listener.request_timeout_secs,
                    ))),
            );

        if config.security.enable_headers {
            router = router.layer(middleware::from_fn(security_headers_middleware));
        }
        router
    }

    /// Run the server until `shutdown` fires, then drain and stop the health monitor.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.state.routes.routes().count(),
            "HTTP server starting"
        );

        let monitor = tokio::spawn(self.state.health.clone().run(shutdown.subscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await;

        // Stop background work even if serving failed.
        shutdown.trigger();
        if let Err(e) = monitor.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
