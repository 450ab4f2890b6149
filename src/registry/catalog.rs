//! Registry catalog - named registries shared across requests.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::{Registry, RegistryError, RegistryResult};
use crate::config::{Engine, Settings};

/// Resolves a registry by name.
///
/// Curators look registries up per request, so implementations must be
/// cheap to query and safe to share across worker threads.
pub trait RegistryProvider: Send + Sync {
    /// Look up a registry by name.
    fn get(&self, name: &str) -> Option<Arc<Registry>>;
}

/// In-process catalog of validated registries.
#[derive(Debug, Default)]
pub struct RegistryCatalog {
    registries: DashMap<String, Arc<Registry>>,
}

impl RegistryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a registry, replacing any previous one with
    /// the same name.
    pub fn register(&self, registry: Registry) -> RegistryResult<Arc<Registry>> {
        registry.validate()?;
        let registry = Arc::new(registry);
        if self
            .registries
            .insert(registry.name.clone(), registry.clone())
            .is_some()
        {
            debug!(registry = %registry.name, "Replaced registry");
        }
        Ok(registry)
    }

    /// Load a registry definition from a `.json` or `.toml` file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> RegistryResult<Arc<Registry>> {
        let registry = Self::read_file(path.as_ref())?;
        self.register(registry)
    }

    fn read_file(path: &Path) -> RegistryResult<Registry> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(RegistryError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Build a catalog from the configured registry files, applying the
    /// configured per-engine row ceilings.
    pub fn from_settings(settings: &Settings) -> RegistryResult<Self> {
        let catalog = Self::new();
        for path in &settings.registry.paths {
            let mut registry = Self::read_file(Path::new(path))?;
            for engine in Engine::ALL {
                if let Some(max_rows) = settings.engine_max_rows(engine) {
                    registry.set_engine_limit(engine, max_rows);
                }
            }
            let registry = catalog.register(registry)?;
            info!(registry = %registry.name, path = %path, "Loaded registry");
        }
        Ok(catalog)
    }

    /// Names of the registered registries.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}

impl RegistryProvider for RegistryCatalog {
    fn get(&self, name: &str) -> Option<Arc<Registry>> {
        self.registries.get(name).map(|r| r.value().clone())
    }
}
