use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

/// Process-wide cache configuration.
///
/// The `app_name` doubles as the cache key namespace: every derived key and
/// the default `clear` prefix start with it.
#[derive(Clone, Debug)]
pub struct Settings {
    pub app_name: String,
    pub cache_url: String,
    pub default_cache_timeout: Duration,
    named_timeouts: HashMap<String, Duration>,
}

impl Settings {
    const DEFAULT_APP_NAME: &str = "cinder";
    const DEFAULT_CACHE_URL: &str = "dummy://";
    const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 60;

    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            cache_url: Self::DEFAULT_CACHE_URL.to_string(),
            default_cache_timeout: Duration::from_secs(Self::DEFAULT_CACHE_TIMEOUT_SECS),
            named_timeouts: HashMap::new(),
        }
    }

    pub fn from_env() -> Self {
        let app_name = std::env::var("CINDER_APP_NAME")
            .unwrap_or_else(|_| Self::DEFAULT_APP_NAME.to_string());
        let cache_url = std::env::var("CINDER_CACHE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_CACHE_URL.to_string());
        let default_secs = std::env::var("CINDER_DEFAULT_CACHE_TIMEOUT")
            .ok()
            .and_then(|v| match v.parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    warn!(value = %v, "CINDER_DEFAULT_CACHE_TIMEOUT is not an integer, using default");
                    None
                }
            })
            .unwrap_or(Self::DEFAULT_CACHE_TIMEOUT_SECS);
        Self {
            app_name,
            cache_url,
            default_cache_timeout: Duration::from_secs(default_secs),
            named_timeouts: HashMap::new(),
        }
    }

    pub fn cache_url(mut self, url: impl Into<String>) -> Self {
        self.cache_url = url.into();
        self
    }

    pub fn default_cache_timeout(mut self, timeout: Duration) -> Self {
        self.default_cache_timeout = timeout;
        self
    }

    /// Register a named timeout, resolvable from a `TtlSpec::ConfigKey`.
    pub fn with_cache_timeout(mut self, name: impl Into<String>, timeout: Duration) -> Self {
        self.named_timeouts.insert(name.into(), timeout);
        self
    }

    pub fn cache_timeout(&self, name: &str) -> Option<Duration> {
        self.named_timeouts.get(name).copied()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Self::DEFAULT_APP_NAME)
    }
}
