use std::sync::Arc;

use shared::Settings;

use crate::ports::CacheBackend;

/// Call-time collaborator supplying configuration and the cache handle.
///
/// Implemented by whatever surrounds a cached call (an application state, a
/// request wrapper). Caching is strictly best-effort: a context that cannot
/// produce a cache handle disables caching for that call, nothing more.
pub trait CacheContext: Send + Sync {
    fn settings(&self) -> &Settings;

    /// The cache handle, when one is resolvable from this context.
    fn cache(&self) -> Option<Arc<dyn CacheBackend>>;

    /// Identity of the authenticated caller, if any. Anonymous callers share
    /// cached values even for per-user bindings.
    fn current_user(&self) -> Option<String> {
        None
    }

    /// Request path, used for key derivation when no static fragment is set.
    fn request_path(&self) -> Option<&str> {
        None
    }
}

/// Capability for objects that contribute their own cache key.
///
/// A non-empty `cache_key` takes precedence over path-based derivation for
/// calls bound to the object.
pub trait Cacheable {
    fn cache_key(&self, _ctx: &dyn CacheContext) -> String {
        String::new()
    }
}
