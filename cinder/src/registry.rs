use std::collections::HashMap;
use std::sync::Arc;

use shared::{Error, Result, Settings};

use crate::ports::CacheBackend;

/// Constructor for one backend scheme.
pub type BackendFactory =
    Arc<dyn Fn(&Settings, &str) -> Result<Arc<dyn CacheBackend>> + Send + Sync>;

/// What `create` accepts: a connection URL to resolve, or a backend that was
/// already constructed elsewhere and is passed through unchanged.
pub enum BackendSpec {
    Url(String),
    Instance(Arc<dyn CacheBackend>),
}

impl From<&str> for BackendSpec {
    fn from(url: &str) -> Self {
        BackendSpec::Url(url.to_string())
    }
}

impl From<String> for BackendSpec {
    fn from(url: String) -> Self {
        BackendSpec::Url(url)
    }
}

impl From<Arc<dyn CacheBackend>> for BackendSpec {
    fn from(backend: Arc<dyn CacheBackend>) -> Self {
        BackendSpec::Instance(backend)
    }
}

/// Explicit scheme -> constructor table.
///
/// Populated at process start; resolution happens once, at `create` time.
/// An unregistered scheme is a configuration error, raised immediately
/// rather than deferred to first use.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites the factory for `scheme`.
    pub fn register<F>(&mut self, scheme: impl Into<String>, factory: F)
    where
        F: Fn(&Settings, &str) -> Result<Arc<dyn CacheBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(scheme.into(), Arc::new(factory));
    }

    pub fn create(
        &self,
        settings: &Settings,
        spec: impl Into<BackendSpec>,
    ) -> Result<Arc<dyn CacheBackend>> {
        match spec.into() {
            BackendSpec::Instance(backend) => Ok(backend),
            BackendSpec::Url(url) => {
                let scheme = url
                    .split_once("://")
                    .map(|(scheme, _)| scheme)
                    .ok_or_else(|| Error::InvalidUrl(url.clone()))?;
                let factory = self
                    .factories
                    .get(scheme)
                    .ok_or_else(|| Error::UnknownScheme(scheme.to_string()))?;
                factory(settings, &url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestBackend;

    fn test_factory(_settings: &Settings, _url: &str) -> Result<Arc<dyn CacheBackend>> {
        Ok(Arc::new(TestBackend::new()))
    }

    #[test]
    fn unknown_scheme_is_a_configuration_error() {
        let registry = BackendRegistry::new();
        let settings = Settings::default();
        let Err(err) = registry.create(&settings, "nowhere://host") else {
            panic!("unregistered scheme resolved");
        };
        assert!(matches!(err, Error::UnknownScheme(scheme) if scheme == "nowhere"));
    }

    #[test]
    fn url_without_scheme_is_rejected() {
        let registry = BackendRegistry::new();
        let settings = Settings::default();
        let Err(err) = registry.create(&settings, "not-a-url") else {
            panic!("schemeless url resolved");
        };
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn registered_scheme_resolves() {
        let mut registry = BackendRegistry::new();
        registry.register("test", test_factory);
        let settings = Settings::default();
        let backend = registry.create(&settings, "test://local").unwrap();
        assert_eq!(backend.name(), "test");
    }

    #[test]
    fn prebuilt_instances_pass_through() {
        let registry = BackendRegistry::new();
        let settings = Settings::default();
        let instance: Arc<dyn CacheBackend> = Arc::new(TestBackend::new());
        let backend = registry.create(&settings, instance).unwrap();
        assert_eq!(backend.url(), "test://");
    }

    #[test]
    fn register_overwrites_existing_entries() {
        let mut registry = BackendRegistry::new();
        registry.register("test", |_, _| {
            Err(Error::Internal("first registration".to_string()))
        });
        registry.register("test", test_factory);
        let settings = Settings::default();
        assert!(registry.create(&settings, "test://local").is_ok());
    }
}
