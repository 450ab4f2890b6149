//! TOML-based configuration for the curator service.
//!
//! Supports a config file (curator.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [registry]
//! default = "reporting"
//! paths = ["./registries/reporting.json"]
//!
//! [engines.oracle]
//! max_rows = 5000
//!
//! [engines.druid]
//! max_rows = 1000
//!
//! [total_rows]
//! engine = "oracle"
//!
//! [buckets.performance]
//! revisions = [{ revision = 0, percent = 90 }, { revision = 1, percent = 10 }]
//! dry_runs = [{ revision = 1, percent = 5, engine = "druid" }]
//!
//! [connections.oracle]
//! driver = "sqlite"
//! connection_string = "${REPORTING_DB_PATH}"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::engine::Engine;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Registry loading.
    pub registry: RegistrySettings,

    /// Per-engine overrides, keyed by engine name.
    pub engines: HashMap<String, EngineSettings>,

    /// Secondary total-rows query configuration.
    pub total_rows: TotalRowsSettings,

    /// Bucket tables, keyed by cube name.
    pub buckets: HashMap<String, CubeBucketSettings>,

    /// Named data-access connections.
    pub connections: HashMap<String, ConnectionSettings>,
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Registry used when a request does not name one.
    #[serde(rename = "default")]
    pub default_name: String,

    /// Registry definition files (`.json` or `.toml`).
    pub paths: Vec<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_name: "default".to_string(),
            paths: Vec::new(),
        }
    }
}

/// Per-engine settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Overrides the registry's declared row ceiling for this engine.
    pub max_rows: Option<u64>,
}

/// Total-rows configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TotalRowsSettings {
    /// Engine whose row ceiling bounds re-planned total-rows requests.
    pub engine: String,
}

impl Default for TotalRowsSettings {
    fn default() -> Self {
        Self {
            engine: Engine::Oracle.as_str().to_string(),
        }
    }
}

impl TotalRowsSettings {
    /// Get the configured row-count engine.
    pub fn engine(&self) -> Result<Engine, SettingsError> {
        self.engine
            .parse()
            .map_err(|_| SettingsError::UnsupportedEngine(self.engine.clone()))
    }
}

/// Bucket table for one cube.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CubeBucketSettings {
    /// Revision split for external traffic. Percentages must total 100.
    pub revisions: Vec<RevisionWeight>,

    /// Revision split for internal traffic. Falls back to `revisions` when empty.
    pub internal_revisions: Vec<RevisionWeight>,

    /// Dry-run variants executed alongside the primary one.
    pub dry_runs: Vec<DryRunWeight>,
}

/// A revision and its share of traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RevisionWeight {
    pub revision: u32,
    pub percent: u32,
}

/// A dry-run variant and its share of traffic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DryRunWeight {
    pub revision: u32,
    pub percent: u32,
    /// Engine the dry run is pinned to, if any.
    #[serde(default)]
    pub engine: Option<String>,
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Data-access driver. Only `sqlite` is supported.
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    pub connection_string: String,
}

impl ConnectionSettings {
    /// Validate the driver name.
    pub fn check_driver(&self) -> Result<(), SettingsError> {
        match self.driver.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(()),
            other => Err(SettingsError::UnsupportedDriver(other.to_string())),
        }
    }

    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `CURATOR_CONFIG`
    /// 2. `./curator.toml`
    /// 3. `~/.config/curator/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("CURATOR_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("curator.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("curator").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Check engine names and drivers.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for name in self.engines.keys() {
            name.parse::<Engine>()
                .map_err(|_| SettingsError::UnsupportedEngine(name.clone()))?;
        }
        self.total_rows.engine()?;
        for (cube, buckets) in &self.buckets {
            for dry_run in &buckets.dry_runs {
                if let Some(engine) = &dry_run.engine {
                    engine.parse::<Engine>().map_err(|_| {
                        SettingsError::InvalidConfig(format!(
                            "bucket '{}' dry run pins unknown engine '{}'",
                            cube, engine
                        ))
                    })?;
                }
            }
        }
        for connection in self.connections.values() {
            connection.check_driver()?;
        }
        Ok(())
    }

    /// Configured row ceiling override for an engine.
    pub fn engine_max_rows(&self, engine: Engine) -> Option<u64> {
        self.engines
            .iter()
            .find(|(name, _)| name.parse::<Engine>().ok() == Some(engine))
            .and_then(|(_, settings)| settings.max_rows)
    }

    /// Get a connection by name.
    pub fn get_connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
