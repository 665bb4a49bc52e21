//! Authentication guard with a shared identity cache.
//!
//! # Flow
//! ```text
//! public template?            → pass (anonymous)
//! no `Authorization: Bearer`  → NoToken
//! store `token:<t>` hit       → identity from cache
//! miss                        → verifier (2 s) → cache 300 s → identity
//! ```
//!
//! The cache write is best-effort: a store failure is logged and the
//! request continues.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::routing::RouteTable;
use crate::security::verifier::{TokenVerifier, VerifiedUser, VerifyError};
use crate::store::SharedStore;

/// Identity the guard attaches to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: String,
    pub merchant_id: Option<String>,
}

/// Cache record stored under `token:<raw-token>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedIdentity {
    pub user_id: String,
    pub role: String,
    #[serde(default)]
    pub merchant_id: Option<String>,
    /// Unix milliseconds.
    pub expires_at: i64,
}

impl From<CachedIdentity> for AuthenticatedUser {
    fn from(c: CachedIdentity) -> Self {
        Self {
            user_id: c.user_id,
            role: c.role,
            merchant_id: c.merchant_id,
        }
    }
}

impl From<VerifiedUser> for AuthenticatedUser {
    fn from(u: VerifiedUser) -> Self {
        Self {
            user_id: u.user_id,
            role: u.role,
            merchant_id: u.merchant_id,
        }
    }
}

pub fn cache_key(token: &str) -> String {
    format!("token:{}", token)
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

pub struct AuthGuard {
    routes: Arc<RouteTable>,
    store: Arc<dyn SharedStore>,
    verifier: Arc<dyn TokenVerifier>,
    cache_ttl: Duration,
}

impl AuthGuard {
    pub fn new(
        routes: Arc<RouteTable>,
        store: Arc<dyn SharedStore>,
        verifier: Arc<dyn TokenVerifier>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            routes,
            store,
            verifier,
            cache_ttl,
        }
    }

    /// Authenticate a request. `Ok(None)` means the path is public.
    pub async fn authenticate(
        &self,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Option<AuthenticatedUser>, GatewayError> {
        if self.routes.public_path_matches(path) {
            return Ok(None);
        }

        let token = bearer_token(headers).ok_or(GatewayError::NoToken)?;
        let key = cache_key(token);

        if let Some(identity) = self.cached(&key).await {
            metrics::record_auth_cache(true);
            return Ok(Some(identity.into()));
        }
        metrics::record_auth_cache(false);

        let user = self.verifier.verify(token).await.map_err(|e| {
            tracing::warn!(error = %e, "Token verification failed");
            match e {
                VerifyError::Invalid => GatewayError::InvalidToken,
                VerifyError::Timeout(_) => GatewayError::AuthBackendTimeout,
                VerifyError::Backend(msg) => GatewayError::AuthBackendError(msg),
            }
        })?;

        self.remember(&key, &user).await;
        Ok(Some(user.into()))
    }

    async fn cached(&self, key: &str) -> Option<CachedIdentity> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Identity cache unavailable");
                return None;
            }
        };
        let identity: CachedIdentity = match serde_json::from_str(&raw) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed cached identity");
                return None;
            }
        };
        if identity.expires_at <= Utc::now().timestamp_millis() {
            return None;
        }
        Some(identity)
    }

    async fn remember(&self, key: &str, user: &VerifiedUser) {
        let record = CachedIdentity {
            user_id: user.user_id.clone(),
            role: user.role.clone(),
            merchant_id: user.merchant_id.clone(),
            expires_at: Utc::now().timestamp_millis() + self.cache_ttl.as_millis() as i64,
        };
        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode identity for cache");
                return;
            }
        };
        if let Err(e) = self.store.set_with_ttl(key, &encoded, self.cache_ttl).await {
            tracing::warn!(error = %e, "Could not cache identity");
        }
    }
}
