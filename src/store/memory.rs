//! Process-local store for single-instance deployments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::{SharedStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A thread-safe TTL map.
///
/// Expiry uses Tokio's clock so tests can drive it with `tokio::time::advance`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Periodically purge expired entries until shutdown.
    pub async fn run_janitor(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, remaining = self.len(), "Purged expired store entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Store janitor stopping");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(match &entry.value {
                    Value::Text(s) => s.clone(),
                    Value::Counter(n) => n.to_string(),
                }));
            }
        }
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let now = Instant::now();
        // The entry guard holds the shard lock, so read-modify-write is atomic.
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = Entry {
                        value: Value::Counter(1),
                        expires_at: now + ttl,
                    };
                    return Ok(1);
                }
                match &mut entry.value {
                    Value::Counter(n) => {
                        *n += 1;
                        Ok(*n)
                    }
                    Value::Text(s) => match s.parse::<u64>() {
                        Ok(n) => {
                            entry.value = Value::Counter(n + 1);
                            Ok(n + 1)
                        }
                        Err(_) => Err(StoreError::NotACounter(key.to_string())),
                    },
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: Value::Counter(1),
                    expires_at: now + ttl,
                });
                Ok(1)
            }
        }
    }
}
