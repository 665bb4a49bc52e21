//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → env.rs (environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; routes never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AuthConfig, CircuitBreakerConfig, DocsConfig, Environment, GatewayConfig,
    HealthCheckConfig, ListenerConfig, LogFormat, ObservabilityConfig, QuotaClass, QuotaConfig,
    RateLimitConfig, SecurityConfig, ServiceConfig, StoreBackend, StoreConfig,
};
