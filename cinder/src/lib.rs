//! cinder: pluggable cache backends, named locks, and a call-level cache
//! wrapper.
//!
//! The crate defines the ports ([`CacheBackend`], [`CacheLock`]), the
//! in-process lock machinery, deterministic key derivation, the
//! [`Cached`] call wrapper and the scheme registry. Concrete backends live
//! in the `storage-engine` crate.

pub mod blocking;
pub mod cached;
pub mod context;
pub mod key;
pub mod lock;
pub mod ports;
pub mod registry;

#[cfg(test)]
pub(crate) mod testsupport;

pub use cached::{BoundCached, Cached, TtlSpec};
pub use context::{CacheContext, Cacheable};
pub use lock::{LocalLock, LockError, LockOptions, LockTable};
pub use ports::{CacheBackend, CacheLock};
pub use registry::{BackendFactory, BackendRegistry, BackendSpec};
