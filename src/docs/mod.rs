//! Unified API documentation.
//!
//! Merges each backend's OpenAPI document into one, served at
//! `/api-docs-json` and regenerated at most once per cache TTL.

pub mod aggregator;

pub use aggregator::{DocSource, DocsAggregator};
