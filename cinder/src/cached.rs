//! Call-level cache wrapper.
//!
//! A [`Cached`] value is an immutable template describing how one callable
//! is cached: key fragment, per-user scoping and TTL policy. Invoking it
//! through [`Cached::call`] (or [`Cached::try_call`] for fallible
//! computations) consults the backend resolved from the [`CacheContext`]
//! and only runs the computation on a miss.
//!
//! Failures of the caching machinery never fail the call: they are logged
//! and degrade to "no caching this time". Failures of the computation
//! itself always propagate.

use std::convert::Infallible;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::Settings;
use tracing::{error, warn};

use crate::context::{CacheContext, Cacheable};
use crate::key;

/// How the effective TTL of a stored result is determined.
#[derive(Clone, Debug)]
pub enum TtlSpec {
    /// The context's configured default timeout.
    Default,
    /// A literal duration.
    Duration(Duration),
    /// A named timeout looked up in the context's settings; a missing name
    /// falls back to the default timeout.
    ConfigKey(String),
}

/// Immutable caching template for one callable.
pub struct Cached {
    callable: &'static str,
    fragment: Option<String>,
    per_user: bool,
    ttl: TtlSpec,
}

impl Cached {
    pub fn new(callable: &'static str) -> Self {
        Self {
            callable,
            fragment: None,
            per_user: false,
            ttl: TtlSpec::Default,
        }
    }

    /// Static key fragment mixed into the derived key.
    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    /// Scope derived keys per authenticated caller. Anonymous callers get
    /// no suffix and therefore share one entry.
    pub fn per_user(mut self) -> Self {
        self.per_user = true;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = TtlSpec::Duration(ttl);
        self
    }

    /// Resolve the TTL from a named settings entry at call time.
    pub fn ttl_from(mut self, config_key: impl Into<String>) -> Self {
        self.ttl = TtlSpec::ConfigKey(config_key.into());
        self
    }

    /// Transient binding to an instance. The template stores nothing; each
    /// bind produces a fresh copy carrying only the borrowed instance, so
    /// concurrent use across instances shares no per-call state.
    pub fn bind<'a, S: Cacheable>(&'a self, instance: &'a S) -> BoundCached<'a> {
        BoundCached {
            template: self,
            class_name: short_type_name::<S>(),
            instance,
        }
    }

    /// Runs `compute` through the cache.
    pub async fn call<T, F, Fut>(&self, ctx: &dyn CacheContext, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let result: Result<T, Infallible> = self
            .run(ctx, None, None, || async move { Ok(compute().await) })
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Runs a fallible `compute` through the cache. An `Err` propagates
    /// untouched and is never stored.
    pub async fn try_call<T, E, F, Fut>(
        &self,
        ctx: &dyn CacheContext,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(ctx, None, None, compute).await
    }

    fn derive_key(
        &self,
        ctx: &dyn CacheContext,
        class_name: Option<&'static str>,
        instance: Option<&dyn Cacheable>,
    ) -> String {
        let mut fragment = instance
            .map(|i| i.cache_key(ctx))
            .filter(|k| !k.is_empty())
            .or_else(|| self.fragment.clone())
            .unwrap_or_default();
        if fragment.is_empty() {
            if let Some(path) = ctx.request_path() {
                fragment = path.to_string();
            }
        }
        if self.per_user {
            if let Some(user) = ctx.current_user() {
                fragment = if fragment.is_empty() {
                    user
                } else {
                    format!("{fragment}-{user}")
                };
            }
        }
        key::compose_key(
            &ctx.settings().app_name,
            class_name,
            self.callable,
            &fragment,
        )
    }

    fn resolve_ttl(&self, settings: &Settings) -> Duration {
        match &self.ttl {
            TtlSpec::Duration(ttl) => *ttl,
            TtlSpec::ConfigKey(name) => settings
                .cache_timeout(name)
                .unwrap_or(settings.default_cache_timeout),
            TtlSpec::Default => settings.default_cache_timeout,
        }
    }

    async fn run<T, E, F, Fut>(
        &self,
        ctx: &dyn CacheContext,
        class_name: Option<&'static str>,
        instance: Option<&dyn Cacheable>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(cache) = ctx.cache() else {
            error!(
                callable = self.callable,
                "could not resolve a cache handle from the call context, executing uncached"
            );
            return compute().await;
        };

        let key = self.derive_key(ctx, class_name, instance);
        if let Some(stored) = cache.get_json(&key).await {
            match serde_json::from_value(stored) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(key = %key, error = %err, "cached value has unexpected shape, recomputing");
                }
            }
        }

        let result = compute().await?;

        match serde_json::to_value(&result) {
            Ok(value) => {
                let ttl = self.resolve_ttl(ctx.settings());
                if let Err(err) = cache.set_json(&key, &value, Some(ttl)).await {
                    error!(key = %key, error = %err, "failed to store computed value in cache");
                }
            }
            Err(err) => {
                warn!(key = %key, error = %err, "could not serialize computed value for caching");
            }
        }

        Ok(result)
    }
}

/// A [`Cached`] template bound to an instance for one call.
pub struct BoundCached<'a> {
    template: &'a Cached,
    class_name: &'static str,
    instance: &'a dyn Cacheable,
}

impl BoundCached<'_> {
    pub async fn call<T, F, Fut>(&self, ctx: &dyn CacheContext, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let result: Result<T, Infallible> = self
            .template
            .run(ctx, Some(self.class_name), Some(self.instance), || {
                async move { Ok(compute().await) }
            })
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    pub async fn try_call<T, E, F, Fut>(
        &self,
        ctx: &dyn CacheContext,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.template
            .run(ctx, Some(self.class_name), Some(self.instance), compute)
            .await
    }
}

fn short_type_name<S>() -> &'static str {
    // Strip generic arguments first: their own paths contain `::`, which
    // would otherwise swallow the base name.
    let full = std::any::type_name::<S>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
