//! Service-to-service tokens attached to every forwarded request.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;

pub const SERVICE_NAME: &str = "api-gateway";
pub const TOKEN_TYPE: &str = "service-to-service";

#[derive(Debug, Error)]
#[error("failed to sign service token: {0}")]
pub struct ServiceTokenError(#[from] jsonwebtoken::errors::Error);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceClaims {
    pub service: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs short-lived HS256 tokens asserting the gateway's identity.
pub struct ServiceTokenIssuer {
    key: EncodingKey,
    ttl_secs: i64,
}

impl std::fmt::Debug for ServiceTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTokenIssuer")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl ServiceTokenIssuer {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl_secs: ttl_secs as i64,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(&config.service_secret, config.service_token_ttl_secs)
    }

    pub fn claims_now(&self) -> ServiceClaims {
        let iat = Utc::now().timestamp();
        ServiceClaims {
            service: SERVICE_NAME.to_string(),
            token_type: TOKEN_TYPE.to_string(),
            iat,
            exp: iat + self.ttl_secs,
        }
    }

    pub fn issue(&self) -> Result<String, ServiceTokenError> {
        let token = encode(&Header::new(Algorithm::HS256), &self.claims_now(), &self.key)?;
        Ok(token)
    }
}
