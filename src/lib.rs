//! Edge API gateway library.
//!
//! Routes public traffic to backend services by path prefix, authenticating
//! callers against an auth backend, rate limiting per caller, and isolating
//! failing backends behind per-service circuit breakers.

pub mod admin;
pub mod config;
pub mod docs;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod store;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
