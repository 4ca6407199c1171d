//! Concrete cache backends behind the `cinder` ports.
//!
//! Two schemes ship by default: `dummy` (in-process, moka-backed) and
//! `redis` (networked, native TTL and cross-process locks).

pub mod memory;
pub mod redis_store;

pub use memory::MemoryBackend;
pub use redis_store::{RedisBackend, RedisLock};

use std::sync::Arc;

use cinder::ports::CacheBackend;
use cinder::registry::BackendRegistry;
use shared::{Result, Settings};

/// A registry with the built-in schemes pre-registered.
pub fn default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register("dummy", MemoryBackend::factory);
    registry.register("redis", RedisBackend::factory);
    registry
}

/// Builds the backend named by `settings.cache_url`, resolved through the
/// default registry. The usual entry point for settings-driven setups,
/// including `Settings::from_env`.
pub fn connect(settings: &Settings) -> Result<Arc<dyn CacheBackend>> {
    default_registry().create(settings, settings.cache_url.as_str())
}
