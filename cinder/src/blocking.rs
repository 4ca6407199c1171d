//! Synchronous wait adapters.
//!
//! Callers on non-cooperative threads (worker pools, synchronous library
//! code) get the same call surface as async callers by bridging through a
//! [`tokio::runtime::Handle`]. The handle must belong to a running
//! multi-threaded runtime; adapter methods must not be called from inside
//! that runtime's own worker threads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use shared::Result;
use tokio::runtime::Handle;
use tracing::warn;

use crate::lock::{LockError, LockOptions};
use crate::ports::{CacheBackend, CacheLock};

/// Synchronous facade over a backend.
#[derive(Clone)]
pub struct BlockingCache {
    backend: Arc<dyn CacheBackend>,
    handle: Handle,
}

impl BlockingCache {
    pub fn new(backend: Arc<dyn CacheBackend>, handle: Handle) -> Self {
        Self { backend, handle }
    }

    pub fn ping(&self) -> bool {
        self.handle.block_on(self.backend.ping())
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.handle.block_on(self.backend.get(key))
    }

    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.handle.block_on(self.backend.set(key, value, ttl))
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.handle.block_on(self.backend.delete(key))
    }

    pub fn hmset(
        &self,
        key: &str,
        fields: HashMap<String, Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.handle.block_on(self.backend.hmset(key, fields, ttl))
    }

    pub fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        self.handle.block_on(self.backend.hmget(key, fields))
    }

    pub fn clear(&self, prefix: Option<&str>) -> Result<u64> {
        self.handle.block_on(self.backend.clear(prefix))
    }

    pub fn get_json(&self, key: &str) -> Option<Value> {
        self.handle.block_on(self.backend.get_json(key))
    }

    pub fn set_json(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        self.handle.block_on(self.backend.set_json(key, value, ttl))
    }

    pub fn lock(&self, name: &str, options: LockOptions) -> BlockingLock {
        BlockingLock {
            lock: self.backend.lock(name, options),
            handle: self.handle.clone(),
        }
    }
}

/// Synchronous lock handle.
pub struct BlockingLock {
    lock: Box<dyn CacheLock>,
    handle: Handle,
}

impl BlockingLock {
    pub fn new(lock: Box<dyn CacheLock>, handle: Handle) -> Self {
        Self { lock, handle }
    }

    pub fn acquire(&mut self) -> bool {
        self.handle.block_on(self.lock.acquire())
    }

    pub fn release(&mut self) -> std::result::Result<(), LockError> {
        self.handle.block_on(self.lock.release())
    }

    /// Scoped acquisition: acquire on entry, run `f`, release on exit.
    /// Fails with [`LockError::AcquireTimeout`] when the initial acquire
    /// does not succeed within its budget. The release also runs when `f`
    /// panics, before the unwind continues.
    pub fn with<R>(&mut self, f: impl FnOnce() -> R) -> std::result::Result<R, LockError> {
        if !self.acquire() {
            return Err(LockError::AcquireTimeout);
        }

        struct ReleaseOnExit<'a> {
            lock: &'a mut BlockingLock,
            armed: bool,
        }

        impl Drop for ReleaseOnExit<'_> {
            fn drop(&mut self) {
                if self.armed {
                    if let Err(err) = self.lock.release() {
                        warn!(error = %err, "lock release while unwinding failed");
                    }
                }
            }
        }

        let mut guard = ReleaseOnExit {
            lock: self,
            armed: true,
        };
        let out = f();
        guard.armed = false;
        guard.lock.release()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestBackend;

    #[test]
    fn blocking_surface_round_trips() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let cache = BlockingCache::new(Arc::new(TestBackend::new()), rt.handle().clone());

        cache.set("k", b"v".to_vec(), None).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
        assert!(cache.delete("k").unwrap());
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn scoped_lock_releases_on_exit() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let cache = BlockingCache::new(Arc::new(TestBackend::new()), rt.handle().clone());

        let mut lock = cache.lock("batch", LockOptions::default());
        let out = lock.with(|| 5).unwrap();
        assert_eq!(out, 5);

        // Released on exit, so a fresh scoped acquisition succeeds.
        let again = lock.with(|| 6).unwrap();
        assert_eq!(again, 6);
    }

    #[test]
    fn scoped_lock_releases_when_the_closure_panics() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let cache = BlockingCache::new(Arc::new(TestBackend::new()), rt.handle().clone());

        let mut lock = cache.lock("report", LockOptions::default());
        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = lock.with(|| -> u32 { panic!("midway") });
        }));
        assert!(unwound.is_err());

        // Released during unwinding, so the next scoped acquisition succeeds.
        assert_eq!(lock.with(|| 3).unwrap(), 3);
    }

    #[test]
    fn scoped_lock_reports_contention() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let cache = BlockingCache::new(Arc::new(TestBackend::new()), rt.handle().clone());

        let mut holder = cache.lock("busy", LockOptions::default());
        assert!(holder.acquire());

        let mut contender = cache.lock("busy", LockOptions::default());
        assert!(matches!(
            contender.with(|| ()),
            Err(LockError::AcquireTimeout)
        ));

        holder.release().unwrap();
    }
}
