use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::StubBackend;

/// Builds a backend from a model reference (a file path).
pub type BackendFactory = fn(&Path) -> Result<Box<dyn DetectorBackend>>;

/// Registry of detector backends, keyed by name.
///
/// Backends are constructed on demand because each needs a model reference.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    ///
    /// `tract` (when enabled) is registered first and becomes the default.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |model| {
            Ok(Box::new(super::backends::TractBackend::new(model)?))
        });
        registry.register("stub", |model| {
            Ok(Box::new(StubBackend::from_json_file(model)?))
        });
        registry
    }

    /// Register a backend factory. The first registered backend becomes the default.
    pub fn register(&mut self, name: &str, factory: BackendFactory) {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), factory);
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn ensure_registered(&self, name: &str) -> Result<()> {
        if self.factories.contains_key(name) {
            Ok(())
        } else {
            Err(anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ))
        }
    }

    /// Construct the named backend for `model`.
    pub fn create(&self, name: &str, model: &Path) -> Result<Box<dyn DetectorBackend>> {
        self.ensure_registered(name)?;
        let factory = self.factories[name];
        factory(model)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn empty_stub(_model: &Path) -> Result<Box<dyn DetectorBackend>> {
        Ok(Box::new(StubBackend::default()))
    }

    #[test]
    fn first_registered_backend_is_default() -> Result<()> {
        let mut registry = BackendRegistry::new();
        assert_eq!(registry.default_name(), None);

        registry.register("beta", empty_stub);
        registry.register("alpha", empty_stub);
        assert_eq!(registry.default_name(), Some("beta"));
        assert_eq!(registry.list(), vec!["alpha", "beta"]);

        let backend = registry.create("alpha", Path::new("unused"))?;
        assert_eq!(backend.name(), "stub");
        assert!(registry.ensure_registered("gamma").is_err());
        Ok(())
    }

    #[test]
    fn builtin_default_matches_config_default() {
        let registry = BackendRegistry::builtin();
        assert_eq!(
            registry.default_name(),
            Some(crate::config::DEFAULT_BACKEND)
        );
    }

    #[test]
    fn unknown_backend_error_lists_available() {
        let registry = BackendRegistry::builtin();
        let err = registry
            .create("yolo-magic", Path::new("model.onnx"))
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("yolo-magic"));
        assert!(err.contains("stub"));
    }

    #[test]
    fn builtin_stub_loads_replay_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(br#"[{"bbox": [0, 0, 4, 4], "class_id": 0, "confidence": 0.8}]"#)?;
        let registry = BackendRegistry::builtin();
        let mut backend = registry.create("stub", file.path())?;
        assert_eq!(backend.name(), "stub");
        let image = crate::raster::PixelArray::filled(8, 8, [1, 1, 1]);
        assert_eq!(backend.predict(&image, 0.5)?.len(), 1);
        Ok(())
    }
}
