//! Request forwarding.
//!
//! # Data Flow
//! ```text
//! RouteMatch + authenticated request
//!     → engine.rs: breaker permit (fail fast when OPEN)
//!     → prepare(): rewrite path, clean headers, inject identity + service token
//!     → hyper client call bounded by the route timeout
//!     → settle permit: any response = success, transport error = failure
//!     → response streamed back, or GatewayError
//! ```

pub mod engine;

pub use engine::{ForwardContext, ProxyEngine};
