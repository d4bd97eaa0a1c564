//! Atomic counter and cache store contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Key-value store with atomic increment-with-expiry and JSON get/put.
///
/// Backs the date-scoped sequence counters and the order cache. Counters
/// must never regress or repeat under concurrent callers; cached values are
/// never authoritative.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically increments the counter at `key`, creating it at 1, and
    /// refreshes its expiry. Returns the new value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Stores a JSON value, optionally with a time-to-live.
    async fn put_json(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Reads a JSON value. Expired entries read as absent.
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Removes a key if present.
    async fn remove(&self, key: &str) -> Result<()>;
}
