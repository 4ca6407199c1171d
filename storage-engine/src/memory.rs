use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cinder::lock::{LockOptions, LockTable};
use cinder::ports::{CacheBackend, CacheLock};
use moka::Expiry;
use moka::future::Cache;
use shared::{Result, Settings};

/// In-process cache backend, registered under the `dummy` scheme.
///
/// Good for single-process deployments and tests: entries live in a moka
/// cache with per-entry TTL expiry, and locks coordinate through a
/// process-local [`LockTable`] owned by this instance.
pub struct MemoryBackend {
    url: String,
    namespace: String,
    entries: Cache<String, Entry>,
    locks: LockTable,
}

#[derive(Clone, Debug)]
enum Stored {
    Value(Arc<Vec<u8>>),
    Hash(Arc<HashMap<String, Vec<u8>>>),
}

#[derive(Clone, Debug)]
struct Entry {
    stored: Stored,
    ttl: Option<Duration>,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    // Overwrites restart the clock with the new entry's TTL.
    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

impl MemoryBackend {
    pub fn new(settings: &Settings, url: &str) -> Self {
        Self {
            url: url.to_string(),
            namespace: settings.app_name.clone(),
            entries: Cache::builder().expire_after(EntryExpiry).build(),
            locks: LockTable::new(),
        }
    }

    /// Registry factory for the `dummy` scheme.
    pub fn factory(settings: &Settings, url: &str) -> Result<Arc<dyn CacheBackend>> {
        Ok(Arc::new(Self::new(settings, url)))
    }
}

impl fmt::Display for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(key).await {
            Some(Entry {
                stored: Stored::Value(data),
                ..
            }) => Ok(Some(data.to_vec())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            stored: Stored::Value(Arc::new(value)),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).await.is_some())
    }

    async fn hmset(
        &self,
        key: &str,
        fields: HashMap<String, Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        // Read-modify-write: concurrent writers to one record race with
        // last-write-wins semantics, same as point writes.
        let mut record = match self.entries.get(key).await {
            Some(Entry {
                stored: Stored::Hash(existing),
                ..
            }) => (*existing).clone(),
            _ => HashMap::new(),
        };
        record.extend(fields);
        let entry = Entry {
            stored: Stored::Hash(Arc::new(record)),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let record = match self.entries.get(key).await {
            Some(Entry {
                stored: Stored::Hash(record),
                ..
            }) => Some(record),
            _ => None,
        };
        Ok(fields
            .iter()
            .map(|field| {
                record
                    .as_ref()
                    .and_then(|r| r.get(*field).cloned())
            })
            .collect())
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<u64> {
        let prefix = prefix.unwrap_or(&self.namespace);
        self.entries.run_pending_tasks().await;
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in &matching {
            self.entries.invalidate(key).await;
        }
        Ok(matching.len() as u64)
    }

    fn lock(&self, name: &str, options: LockOptions) -> Box<dyn CacheLock> {
        Box::new(self.locks.lock(name, options))
    }
}
