use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cinder::lock::{LockError, LockOptions};
use cinder::ports::{CacheBackend, CacheLock};
use deadpool_redis::{Connection, Pool, Runtime};
use redis::AsyncCommands;
use shared::{Error, Result, Settings};
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

// Keys are enumerated and deleted in bounded batches so a clear over a large
// keyspace never blocks the server on one unbounded command.
const SCAN_COUNT: usize = 1000;
const DEL_CHUNK: usize = 5000;

// Deletes the lock key only when the caller's token still owns it.
const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
";

/// Redis cache backend, registered under the `redis` scheme.
///
/// TTLs and locking are native to the server, so both compose across
/// processes sharing the same Redis instance.
pub struct RedisBackend {
    url: String,
    namespace: String,
    pool: Pool,
}

impl RedisBackend {
    pub fn new(settings: &Settings, url: &str) -> Result<Self> {
        let pool = deadpool_redis::Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| Error::InvalidUrl(format!("{url}: {err}")))?;
        Ok(Self {
            url: url.to_string(),
            namespace: settings.app_name.clone(),
            pool,
        })
    }

    /// Registry factory for the `redis` scheme.
    pub fn factory(settings: &Settings, url: &str) -> Result<Arc<dyn CacheBackend>> {
        Ok(Arc::new(Self::new(settings, url)?))
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool.get().await.map_err(backend_err)
    }
}

fn backend_err(err: impl fmt::Display) -> Error {
    Error::Backend(err.to_string())
}

impl fmt::Display for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn ping(&self) -> bool {
        let Ok(mut conn) = self.pool.get().await else {
            return false;
        };
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(backend_err)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => conn
                .pset_ex::<_, _, ()>(key, value, ttl.as_millis() as u64)
                .await
                .map_err(backend_err),
            None => conn.set::<_, _, ()>(key, value).await.map_err(backend_err),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await.map_err(backend_err)?;
        Ok(removed > 0)
    }

    async fn hmset(
        &self,
        key: &str,
        fields: HashMap<String, Vec<u8>>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let pairs: Vec<(String, Vec<u8>)> = fields.into_iter().collect();
        conn.hset_multiple::<_, _, _, ()>(key, &pairs)
            .await
            .map_err(backend_err)?;
        if let Some(ttl) = ttl {
            conn.pexpire::<_, ()>(key, ttl.as_millis() as i64)
                .await
                .map_err(backend_err)?;
        }
        Ok(())
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut conn = self.conn().await?;
        let values: Vec<Option<Vec<u8>>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(values)
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<u64> {
        let prefix = prefix.unwrap_or(&self.namespace);
        let pattern = format!("{prefix}*");
        warn!(pattern = %pattern, cache = %self.url, "clearing keys matching pattern");

        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(backend_err)?;
            for chunk in keys.chunks(DEL_CHUNK) {
                let deleted: u64 = conn.del(chunk).await.map_err(backend_err)?;
                removed += deleted;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(removed)
    }

    fn lock(&self, name: &str, options: LockOptions) -> Box<dyn CacheLock> {
        Box::new(RedisLock {
            pool: self.pool.clone(),
            key: name.to_string(),
            token: Uuid::new_v4().to_string(),
            options,
            held: false,
        })
    }
}

/// Distributed lock: a token value stored under the lock name with `SET NX`,
/// released by a compare-and-delete script so only the owner can release.
/// The hold timeout maps to the key's native `PX` expiry.
pub struct RedisLock {
    pool: Pool,
    key: String,
    token: String,
    options: LockOptions,
    held: bool,
}

impl RedisLock {
    async fn try_acquire(&self) -> redis::RedisResult<bool> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| redis::RedisError::from(std::io::Error::other(err.to_string())))?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(&self.key).arg(&self.token).arg("NX");
        if let Some(hold) = self.options.hold_timeout {
            cmd.arg("PX").arg(hold.as_millis() as u64);
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl CacheLock for RedisLock {
    async fn acquire(&mut self) -> bool {
        let deadline = Instant::now() + self.options.blocking;
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    self.held = true;
                    return true;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(lock = %self.key, error = %err, "lock acquisition failed");
                    return false;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.options.sleep.min(deadline - now)).await;
        }
    }

    async fn release(&mut self) -> std::result::Result<(), LockError> {
        if !self.held {
            return Err(LockError::NotHeld);
        }
        // `held` stays set across transport errors so release can be
        // retried; only a script verdict settles ownership.
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| LockError::Backend(err.to_string()))?;
        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| LockError::Backend(err.to_string()))?;
        self.held = false;
        if released == 0 {
            // The key expired (hold timeout) or another owner took over.
            return Err(LockError::NotHeld);
        }
        Ok(())
    }
}
