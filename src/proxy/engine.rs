//! Failure-aware forwarding engine.

use std::io;
use std::sync::Arc;

use axum::{
    body::{Body, BodyDataStream, Bytes, HttpBody},
    http::{header, HeaderValue, Request, Uri},
    response::Response,
};
use futures_util::{stream, StreamExt};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::time::{self, Instant};

use crate::error::GatewayError;
use crate::http::request::X_REQUEST_ID;
use crate::resilience::timeouts::{classify_error, with_deadline, NetworkFailure};
use crate::resilience::{BreakerPermit, CircuitBreakerRegistry, FailureOutcome};
use crate::routing::RouteMatch;
use crate::security::auth::AuthenticatedUser;
use crate::security::headers::{inject_identity, strip_identity_headers, X_SERVICE_TOKEN};
use crate::security::ServiceTokenIssuer;

/// Transport headers never forwarded as-is.
const HOP_HEADERS: [header::HeaderName; 6] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::TE,
    header::UPGRADE,
];

/// Per-request data the engine needs besides the request itself.
#[derive(Debug, Clone, Copy)]
pub struct ForwardContext<'a> {
    pub request_id: &'a str,
    pub user: Option<&'a AuthenticatedUser>,
}

pub struct ProxyEngine {
    client: Client<HttpConnector, Body>,
    breakers: Arc<CircuitBreakerRegistry>,
    tokens: ServiceTokenIssuer,
    api_prefix: String,
}

impl ProxyEngine {
    pub fn new(
        breakers: Arc<CircuitBreakerRegistry>,
        tokens: ServiceTokenIssuer,
        api_prefix: impl Into<String>,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            breakers,
            tokens,
            api_prefix: api_prefix.into(),
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Backend path: the route prefix is replaced by the API prefix,
    /// so `/api/v1/cart/items` becomes `/api/v1/items`.
    pub fn upstream_path(&self, matched: &RouteMatch<'_>) -> String {
        let prefix = matched.route.path_prefix.as_str();
        let rest = if prefix == "/" {
            matched.relative_path
        } else {
            matched
                .relative_path
                .strip_prefix(prefix)
                .unwrap_or(matched.remainder)
        };
        let path = format!("{}{}", self.api_prefix, rest);
        if path.is_empty() {
            "/".to_string()
        } else {
            path
        }
    }

    /// Pre-call stage: build the backend request from the client request.
    pub fn prepare(
        &self,
        matched: &RouteMatch<'_>,
        request: Request<Body>,
        ctx: ForwardContext<'_>,
    ) -> Result<Request<Body>, GatewayError> {
        let (mut parts, body) = request.into_parts();

        let mut target = format!("{}{}", matched.route.base(), self.upstream_path(matched));
        if let Some(query) = parts.uri.query() {
            target.push('?');
            target.push_str(query);
        }
        parts.uri = target
            .parse::<Uri>()
            .map_err(|e| GatewayError::Internal(format!("invalid upstream uri {}: {}", target, e)))?;

        let headers = &mut parts.headers;
        for name in HOP_HEADERS.iter() {
            headers.remove(name);
        }
        strip_identity_headers(headers);

        if let Some(user) = ctx.user {
            inject_identity(headers, user);
        }
        if let Ok(id) = HeaderValue::from_str(ctx.request_id) {
            headers.insert(X_REQUEST_ID, id);
        }

        let token = self
            .tokens
            .issue()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let token = HeaderValue::from_str(&token)
            .map_err(|e| GatewayError::Internal(format!("service token header: {}", e)))?;
        headers.insert(X_SERVICE_TOKEN, token);

        // The client speaks HTTP/1.1 to backends regardless of the inbound version.
        parts.version = axum::http::Version::HTTP_11;

        Ok(Request::from_parts(parts, body))
    }

    /// Forward to the matched backend, updating its breaker.
    pub async fn forward(
        &self,
        matched: &RouteMatch<'_>,
        request: Request<Body>,
        ctx: ForwardContext<'_>,
    ) -> Result<Response, GatewayError> {
        let route = matched.route;
        let breaker = self.breakers.get(&route.name);

        let permit = breaker.try_acquire().map_err(|e| {
            tracing::warn!(
                request_id = %ctx.request_id,
                service = %route.name,
                retry_in_ms = e.retry_in.as_millis() as u64,
                "Circuit open, rejecting without contacting backend"
            );
            GatewayError::CircuitOpen {
                service: route.name.clone(),
            }
        })?;

        let upstream = self.prepare(matched, request, ctx)?;
        tracing::debug!(
            request_id = %ctx.request_id,
            service = %route.name,
            target = %upstream.uri(),
            half_open = permit.is_probe(),
            "Proxying request"
        );

        // One deadline covers the response head and the whole body.
        let deadline = Instant::now() + route.request_timeout;
        match with_deadline(route.request_timeout, self.client.request(upstream)).await {
            Ok(Ok(response)) => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    service = %route.name,
                    status = response.status().as_u16(),
                    "Backend responded"
                );
                let (parts, body) = response.into_parts();
                // Backend-reported 5xx is still a reachable backend.
                let body = if body.is_end_stream() {
                    permit.record_success();
                    Body::empty()
                } else {
                    DeadlineBody {
                        inner: Body::new(body).into_data_stream(),
                        deadline,
                        permit: Some(permit),
                        service: route.name.clone(),
                        request_id: ctx.request_id.to_string(),
                    }
                    .into_body()
                };
                Ok(Response::from_parts(parts, body))
            }
            Ok(Err(e)) => Err(self.settle_failure(
                permit,
                &route.name,
                ctx.request_id,
                classify_error(&e),
                e.to_string(),
            )),
            Err(kind) => Err(self.settle_failure(
                permit,
                &route.name,
                ctx.request_id,
                kind,
                format!("no response within {:?}", route.request_timeout),
            )),
        }
    }

    /// Post-call stage for transport failures: record it, then map it.
    fn settle_failure(
        &self,
        permit: BreakerPermit,
        service: &str,
        request_id: &str,
        kind: NetworkFailure,
        detail: String,
    ) -> GatewayError {
        tracing::error!(
            request_id = %request_id,
            service = %service,
            kind = ?kind,
            error = %detail,
            "Proxy error"
        );

        let service = service.to_string();
        if permit.record_failure() == FailureOutcome::Open {
            return GatewayError::CircuitTripped { service, detail };
        }
        match kind {
            NetworkFailure::ConnectionRefused => GatewayError::UpstreamUnavailable { service, detail },
            NetworkFailure::TimedOut => GatewayError::UpstreamTimeout { service },
            NetworkFailure::Other => GatewayError::UpstreamFailure { service, detail },
        }
    }
}

/// Backend response body bounded by the call's deadline.
///
/// Holds the breaker permit until the body ends: a complete body is a
/// success, a read error or an expired deadline is a failure. A body dropped
/// early (client went away) settles nothing.
struct DeadlineBody {
    inner: BodyDataStream,
    deadline: Instant,
    permit: Option<BreakerPermit>,
    service: String,
    request_id: String,
}

impl DeadlineBody {
    fn into_body(self) -> Body {
        Body::from_stream(stream::unfold(self, Self::next_chunk))
    }

    async fn next_chunk(mut self) -> Option<(Result<Bytes, axum::Error>, Self)> {
        // No permit left means the body already ended or failed.
        let permit = self.permit.take()?;
        match time::timeout_at(self.deadline, self.inner.next()).await {
            Ok(Some(Ok(chunk))) => {
                self.permit = Some(permit);
                Some((Ok(chunk), self))
            }
            Ok(None) => {
                permit.record_success();
                None
            }
            Ok(Some(Err(e))) => {
                self.fail(permit, &e.to_string());
                Some((Err(e), self))
            }
            Err(_) => {
                self.fail(permit, "response body not complete before deadline");
                let err = io::Error::new(io::ErrorKind::TimedOut, "backend response body timed out");
                Some((Err(axum::Error::new(err)), self))
            }
        }
    }

    fn fail(&self, permit: BreakerPermit, detail: &str) {
        let outcome = permit.record_failure();
        tracing::error!(
            request_id = %self.request_id,
            service = %self.service,
            error = %detail,
            breaker_open = outcome == FailureOutcome::Open,
            "Backend response body failed"
        );
    }
}
