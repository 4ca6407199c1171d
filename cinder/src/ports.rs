use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shared::{Error, Result};
use tracing::warn;

use crate::lock::{LockError, LockOptions};

// Ports are the pluggable extension points for underlying cache backends

/// Port for a key/value cache backend.
///
/// Keys are opaque strings, values opaque byte payloads unless they go
/// through the JSON helpers. Implementations are selected by URL scheme
/// through a [`crate::registry::BackendRegistry`].
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Scheme name this backend was registered under.
    fn name(&self) -> &str;

    /// Connection URL the backend was constructed from.
    fn url(&self) -> &str;

    /// Key namespace used by `clear` when no prefix is given.
    fn namespace(&self) -> &str;

    /// Liveness probe.
    async fn ping(&self) -> bool {
        true
    }

    /// Stored payload, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores a payload, overwriting any existing value. With a `ttl` the
    /// entry becomes unavailable to `get` after the duration elapses.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Removes an entry if present. Idempotent.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Sets fields on the composite (hash) record at `key`.
    async fn hmset(
        &self,
        key: &str,
        fields: HashMap<String, Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Reads the given fields of the hash record at `key`, in field order,
    /// without loading the whole record.
    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Deletes every key starting with `prefix` (default: the application
    /// namespace) and returns the count removed. Networked implementations
    /// enumerate and delete in bounded batches.
    async fn clear(&self, prefix: Option<&str>) -> Result<u64>;

    /// A scoped lock handle for coordinating exclusive access to `name`
    /// across concurrent callers of this backend's coordination domain.
    fn lock(&self, name: &str, options: LockOptions) -> Box<dyn CacheLock>;

    /// `get` plus JSON decode. A payload that does not decode is a logged
    /// warning and a miss, never an error; read failures degrade the same
    /// way.
    async fn get_json(&self, key: &str) -> Option<Value> {
        match self.get(key).await {
            Ok(Some(raw)) => match serde_json::from_slice(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(key, error = %err, "could not decode cached value as JSON");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// JSON-encodes `value` then `set`s it.
    async fn set_json(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let raw = serde_json::to_vec(value).map_err(|err| Error::Internal(err.to_string()))?;
        self.set(key, raw, ttl).await
    }
}

/// Port for a named lock scoped to a backend's coordination domain.
///
/// `acquire` treats an expired acquisition budget as a normal `false`
/// outcome. `release` by a handle that does not currently hold the lock is
/// the sole error transition.
#[async_trait]
pub trait CacheLock: Send {
    async fn acquire(&mut self) -> bool;

    async fn release(&mut self) -> std::result::Result<(), LockError>;
}
