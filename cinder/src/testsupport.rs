//! In-crate test doubles: a hashmap-backed backend and a configurable
//! context, used by the wrapper and registry tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{Result, Settings};

use crate::context::CacheContext;
use crate::lock::{LockOptions, LockTable};
use crate::ports::{CacheBackend, CacheLock};

pub(crate) struct TestBackend {
    values: Mutex<HashMap<String, Vec<u8>>>,
    hashes: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
    locks: LockTable,
}

impl TestBackend {
    pub(crate) fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            hashes: Mutex::new(HashMap::new()),
            locks: LockTable::new(),
        }
    }
}

#[async_trait]
impl CacheBackend for TestBackend {
    fn name(&self) -> &str {
        "test"
    }

    fn url(&self) -> &str {
        "test://"
    }

    fn namespace(&self) -> &str {
        "test"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Option<Duration>) -> Result<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().remove(key).is_some())
    }

    async fn hmset(
        &self,
        key: &str,
        fields: HashMap<String, Vec<u8>>,
        _ttl: Option<Duration>,
    ) -> Result<()> {
        self.hashes
            .lock()
            .entry(key.to_string())
            .or_default()
            .extend(fields);
        Ok(())
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let hashes = self.hashes.lock();
        let record = hashes.get(key);
        Ok(fields
            .iter()
            .map(|field| record.and_then(|r| r.get(*field).cloned()))
            .collect())
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<u64> {
        let prefix = prefix.unwrap_or_else(|| self.namespace());
        let mut values = self.values.lock();
        let before = values.len();
        values.retain(|key, _| !key.starts_with(prefix));
        Ok((before - values.len()) as u64)
    }

    fn lock(&self, name: &str, options: LockOptions) -> Box<dyn CacheLock> {
        Box::new(self.locks.lock(name, options))
    }
}

pub(crate) struct TestContext {
    settings: Settings,
    cache: Option<Arc<dyn CacheBackend>>,
    user: Option<String>,
    path: Option<String>,
}

impl TestContext {
    pub(crate) fn new() -> Self {
        Self::with_backend(Arc::new(TestBackend::new()))
    }

    pub(crate) fn with_backend(backend: Arc<TestBackend>) -> Self {
        Self {
            settings: Settings::new("test"),
            cache: Some(backend),
            user: None,
            path: None,
        }
    }

    pub(crate) fn without_backend() -> Self {
        Self {
            settings: Settings::new("test"),
            cache: None,
            user: None,
            path: None,
        }
    }

    pub(crate) fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub(crate) fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl CacheContext for TestContext {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn cache(&self) -> Option<Arc<dyn CacheBackend>> {
        self.cache.clone()
    }

    fn current_user(&self) -> Option<String> {
        self.user.clone()
    }

    fn request_path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}
