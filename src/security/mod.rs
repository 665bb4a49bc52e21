//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after route lookup):
//!     → auth.rs (bearer token, identity cache, verifier.rs on miss)
//!     → rate_limit.rs (quota class per caller)
//!     → headers.rs (strip spoofed identity, inject verified identity)
//!     → service_token.rs (sign X-Service-Token for the backend)
//! ```
//!
//! # Design Decisions
//! - Fail closed on authentication: a verifier error is never anonymous access
//! - Fail open on rate limiting: a store outage must not reject traffic
//! - No trust in client-supplied identity headers

pub mod auth;
pub mod headers;
pub mod rate_limit;
pub mod service_token;
pub mod verifier;

pub use auth::{AuthGuard, AuthenticatedUser, CachedIdentity};
pub use rate_limit::RateLimiter;
pub use service_token::ServiceTokenIssuer;
pub use verifier::{HttpTokenVerifier, TokenVerifier, VerifiedUser, VerifyError};
