use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::ports::CacheLock;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock is not held by this handle")]
    NotHeld,

    #[error("timed out acquiring lock")]
    AcquireTimeout,

    #[error("lock backend: {0}")]
    Backend(String),
}

#[derive(Clone, Copy, Debug)]
pub struct LockOptions {
    /// Maximum time `acquire` waits before giving up. Zero means a single
    /// uncontended attempt.
    pub blocking: Duration,
    /// Auto-release deadline once held. `None` holds until released.
    pub hold_timeout: Option<Duration>,
    /// Poll interval for backends that acquire by retrying.
    pub sleep: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            blocking: Duration::ZERO,
            hold_timeout: None,
            sleep: Duration::from_millis(200),
        }
    }
}

impl LockOptions {
    pub fn blocking(mut self, budget: Duration) -> Self {
        self.blocking = budget;
        self
    }

    pub fn hold_timeout(mut self, deadline: Duration) -> Self {
        self.hold_timeout = Some(deadline);
        self
    }

    pub fn sleep(mut self, interval: Duration) -> Self {
        self.sleep = interval;
        self
    }
}

/// Process-local coordination domain.
///
/// One mutex per lock name, created lazily on first use and retained for
/// reuse. The table is owned by the backend instance it coordinates for.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub fn lock(&self, name: &str, options: LockOptions) -> LocalLock {
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        LocalLock::new(mutex, options)
    }
}

/// In-process lock handle backed by a [`LockTable`] entry.
///
/// The held guard lives in a shared slot so a hold-timeout task can release
/// it even when the holder never calls `release`.
pub struct LocalLock {
    mutex: Arc<Mutex<()>>,
    options: LockOptions,
    held: Arc<SyncMutex<Option<OwnedMutexGuard<()>>>>,
    reaper: Option<JoinHandle<()>>,
}

impl LocalLock {
    fn new(mutex: Arc<Mutex<()>>, options: LockOptions) -> Self {
        Self {
            mutex,
            options,
            held: Arc::new(SyncMutex::new(None)),
            reaper: None,
        }
    }

    fn schedule_reaper(&mut self) {
        let Some(deadline) = self.options.hold_timeout else {
            return;
        };
        let held = Arc::clone(&self.held);
        self.reaper = Some(tokio::spawn(async move {
            sleep(deadline).await;
            // Dropping the guard releases the underlying mutex.
            held.lock().take();
        }));
    }
}

#[async_trait]
impl CacheLock for LocalLock {
    async fn acquire(&mut self) -> bool {
        match timeout(self.options.blocking, self.mutex.clone().lock_owned()).await {
            Ok(guard) => {
                *self.held.lock() = Some(guard);
                self.schedule_reaper();
                true
            }
            Err(_) => false,
        }
    }

    async fn release(&mut self) -> Result<(), LockError> {
        let guard = self.held.lock().take().ok_or(LockError::NotHeld)?;
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
        drop(guard);
        Ok(())
    }
}

impl Drop for LocalLock {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
    }
}
