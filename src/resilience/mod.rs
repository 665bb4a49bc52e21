//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (fail fast while the backend is judged down)
//!     → timeouts.rs (enforce the route's request timeout)
//!     → On network failure: classify, record breaker failure
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No internal retries; the breaker only stops issuing calls
//! - Backend 5xx responses are not breaker failures, only transport errors are

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerPermit, BreakerSnapshot, CircuitBreaker, CircuitBreakerRegistry, CircuitOpenError,
    CircuitState, FailureOutcome,
};
pub use timeouts::{classify_error, NetworkFailure};
