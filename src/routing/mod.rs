//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (strip API prefix, route lookup)
//!     → matcher.rs (segment-aware prefix match)
//!     → Return: matched ServiceRoute or RouteNotFound
//!
//! Route Compilation (at startup):
//!     ServiceConfig[]
//!     → Sort by prefix length (stable)
//!     → Compile public/strict path templates
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{RouteBuildError, RouteMatch, RouteNotFound, RouteTable, ServiceRoute};
