//! Token verification against the auth backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("token is not valid")]
    Invalid,
    #[error("auth backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("auth backend request failed: {0}")]
    Backend(String),
}

/// The user a valid token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedUser {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub merchant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    valid: bool,
    user: Option<VerifiedUser>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Scalar::deserialize(d).map(String::from)
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Scalar>::deserialize(d)?;
    Ok(value.map(String::from).filter(|s| !s.is_empty()))
}

/// Source of truth for bearer tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, VerifyError>;
}

/// Calls `POST {auth}{verify_path}` with `{"token": ...}`.
#[derive(Debug, Clone)]
pub struct HttpTokenVerifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTokenVerifier {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }
}

impl HttpTokenVerifier {
    /// Send the token and decode the verdict, unbounded.
    async fn exchange(&self, token: &str) -> Result<VerifyResponse, VerifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VerifyError::Timeout(self.timeout)
                } else {
                    VerifyError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(VerifyError::Backend(format!("verify returned {}", status)));
        }
        if status.is_client_error() {
            return Err(VerifyError::Invalid);
        }

        response
            .json()
            .await
            .map_err(|e| VerifyError::Backend(format!("malformed verify response: {}", e)))
    }
}

#[async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, VerifyError> {
        // One deadline for the request and the response body together.
        let body = tokio::time::timeout(self.timeout, self.exchange(token))
            .await
            .map_err(|_| VerifyError::Timeout(self.timeout))??;

        match body {
            VerifyResponse {
                valid: true,
                user: Some(user),
            } => Ok(user),
            _ => Err(VerifyError::Invalid),
        }
    }
}
