//! Shared key-value store.
//!
//! # Data Flow
//! ```text
//! AuthGuard   → get / set_with_ttl       (identity cache, `token:<raw>`)
//! RateLimiter → increment_with_ttl       (window counters, `rl:<class>:<caller>:<window>`)
//!     → memory.rs (single instance, DashMap)
//!     → redis.rs  (multi instance, Redis)
//! ```
//!
//! # Design Decisions
//! - Minimal interface so guard and limiter logic never see the backend
//! - Increment is atomic at the store level and sets the TTL only when the
//!   key is created, so concurrent callers share one window
//! - Every remote operation carries a timeout

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use tokio::task::JoinHandle;

use crate::config::{StoreBackend, StoreConfig};
use crate::lifecycle::Shutdown;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("stored value is not a counter: {0}")]
    NotACounter(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value operations the gateway needs from its shared store.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Get a live (non-expired) value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Atomically increment a counter, creating it with `ttl` if absent.
    /// Returns the post-increment count.
    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64>;
}

/// A connected store plus its background maintenance task, if any.
pub struct StoreHandle {
    pub store: Arc<dyn SharedStore>,
    pub janitor: Option<JoinHandle<()>>,
}

/// Build the configured store.
///
/// The in-memory backend gets a janitor task that purges expired entries
/// until `shutdown` fires.
pub async fn connect(config: &StoreConfig, shutdown: &Shutdown) -> StoreResult<StoreHandle> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory shared store");
            let store = Arc::new(MemoryStore::new());
            let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
            let janitor = tokio::spawn(store.clone().run_janitor(interval, shutdown.subscribe()));
            Ok(StoreHandle {
                store,
                janitor: Some(janitor),
            })
        }
        StoreBackend::Redis => {
            let store = RedisStore::connect(config).await?;
            Ok(StoreHandle {
                store: Arc::new(store),
                janitor: None,
            })
        }
    }
}
