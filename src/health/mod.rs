//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Background checks (active.rs):
//!     Periodic timer
//!     → Probe every health-checked backend in parallel
//!     → Wait for all outcomes, success or failure
//!     → Overwrite per-backend snapshots in state.rs
//!
//! On-demand checks (active.rs):
//!     /health/all request
//!     → Probe every backend with the short timeout
//!     → Report without touching the background snapshots
//! ```
//!
//! # Design Decisions
//! - One backend's failure never aborts checks of the others
//! - Snapshots are overwritten, never historical
//! - Read-only with respect to the request path

pub mod active;
pub mod state;

pub use active::{HealthMonitor, HealthTarget};
pub use state::{HealthReport, HealthSnapshot, HealthState, HealthStatus, OverallStatus};
