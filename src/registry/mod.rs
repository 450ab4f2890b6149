//! Schema registry.
//!
//! A registry is the catalog a reporting request is validated and planned
//! against. It describes, per cube, the facts that can answer metric
//! queries (one fact per revision/engine combination) and the dimensions
//! those facts join to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    RegistryCatalog                       │
//! │  name ──► Arc<Registry>                                  │
//! │             ├── cubes:      Cube ──► facts (rev, engine) │
//! │             ├── dimensions: pk alias, attributes, engines│
//! │             └── engine_limits: declared max rows         │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod catalog;

pub use catalog::{RegistryCatalog, RegistryProvider};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Engine;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised while loading or validating a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Cube '{cube}' references unknown dimension '{dimension}'")]
    UnknownDimension { cube: String, dimension: String },

    #[error("Dimension '{dimension}' does not list its primary key '{primary_key}' as an attribute")]
    MissingPrimaryKey {
        dimension: String,
        primary_key: String,
    },

    #[error("Dimension '{0}' is not served by any engine")]
    NoEngines(String),

    #[error("Cube '{0}' has no facts")]
    NoFacts(String),

    #[error("Duplicate definition of '{0}'")]
    Duplicate(String),

    #[error("Failed to read registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse registry JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse registry TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unsupported registry file format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Default declared row ceiling for engines without an explicit limit.
pub const DEFAULT_MAX_ROWS: u64 = 5000;

fn default_max_rows() -> u64 {
    DEFAULT_MAX_ROWS
}

/// A named schema catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    pub name: String,
    #[serde(default = "default_max_rows")]
    pub default_max_rows: u64,
    #[serde(default)]
    pub engine_limits: Vec<EngineLimit>,
    #[serde(default)]
    pub cubes: Vec<Cube>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

/// Declared row ceiling of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLimit {
    pub engine: Engine,
    pub max_rows: u64,
}

/// A cube: facts plus the dimensions they join to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cube {
    pub name: String,
    pub dimensions: Vec<String>,
    pub facts: Vec<Fact>,
}

/// A physical fact table serving a cube on one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    #[serde(default)]
    pub revision: u32,
    pub engine: Engine,
    /// Aliases the fact can serve, including foreign-key aliases.
    pub columns: Vec<String>,
    /// Relative cost; lower is preferred.
    #[serde(default = "default_cost")]
    pub cost: u32,
}

fn default_cost() -> u32 {
    100
}

/// A dimension table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    /// Name exposed to callers; defaults to `name`.
    #[serde(default)]
    pub public_name: Option<String>,
    pub primary_key_alias: String,
    pub attributes: Vec<String>,
    pub engines: Vec<Engine>,
}

impl Registry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default_max_rows: DEFAULT_MAX_ROWS,
            engine_limits: Vec::new(),
            cubes: Vec::new(),
            dimensions: Vec::new(),
        }
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_cube(mut self, cube: Cube) -> Self {
        self.cubes.push(cube);
        self
    }

    pub fn with_engine_limit(mut self, engine: Engine, max_rows: u64) -> Self {
        self.set_engine_limit(engine, max_rows);
        self
    }

    /// Set or replace the declared row ceiling of an engine.
    pub fn set_engine_limit(&mut self, engine: Engine, max_rows: u64) {
        match self.engine_limits.iter_mut().find(|l| l.engine == engine) {
            Some(limit) => limit.max_rows = max_rows,
            None => self.engine_limits.push(EngineLimit { engine, max_rows }),
        }
    }

    /// Declared maximum rows the engine may be asked for.
    pub fn max_rows(&self, engine: Engine) -> u64 {
        self.engine_limits
            .iter()
            .find(|l| l.engine == engine)
            .map(|l| l.max_rows)
            .unwrap_or(self.default_max_rows)
    }

    pub fn cube(&self, name: &str) -> Option<&Cube> {
        self.cubes.iter().find(|c| c.name == name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// Dimensions joinable from a cube, in declaration order.
    pub fn cube_dimensions<'a>(&'a self, cube: &'a Cube) -> impl Iterator<Item = &'a Dimension> {
        cube.dimensions.iter().filter_map(|name| self.dimension(name))
    }

    /// Check referential integrity.
    pub fn validate(&self) -> RegistryResult<()> {
        let mut seen = std::collections::HashSet::new();
        for dimension in &self.dimensions {
            if !seen.insert(format!("dimension:{}", dimension.name)) {
                return Err(RegistryError::Duplicate(dimension.name.clone()));
            }
            if !dimension.has_attribute(&dimension.primary_key_alias) {
                return Err(RegistryError::MissingPrimaryKey {
                    dimension: dimension.name.clone(),
                    primary_key: dimension.primary_key_alias.clone(),
                });
            }
            if dimension.engines.is_empty() {
                return Err(RegistryError::NoEngines(dimension.name.clone()));
            }
        }

        for cube in &self.cubes {
            if !seen.insert(format!("cube:{}", cube.name)) {
                return Err(RegistryError::Duplicate(cube.name.clone()));
            }
            if cube.facts.is_empty() {
                return Err(RegistryError::NoFacts(cube.name.clone()));
            }
            for name in &cube.dimensions {
                if self.dimension(name).is_none() {
                    return Err(RegistryError::UnknownDimension {
                        cube: cube.name.clone(),
                        dimension: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Cube {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dimensions: Vec::new(),
            facts: Vec::new(),
        }
    }

    pub fn with_dimensions<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions.extend(dimensions.into_iter().map(Into::into));
        self
    }

    pub fn with_fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    /// Whether any fact of the cube serves the alias.
    pub fn has_fact_column(&self, alias: &str) -> bool {
        self.facts.iter().any(|f| f.has_column(alias))
    }

    /// Lowest revision defined for the cube.
    pub fn default_revision(&self) -> Option<u32> {
        self.facts.iter().map(|f| f.revision).min()
    }

    pub fn has_revision(&self, revision: u32) -> bool {
        self.facts.iter().any(|f| f.revision == revision)
    }
}

impl Fact {
    pub fn new<I, S>(name: &str, engine: Engine, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            revision: 0,
            engine,
            columns: columns.into_iter().map(Into::into).collect(),
            cost: default_cost(),
        }
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub fn has_column(&self, alias: &str) -> bool {
        self.columns.iter().any(|c| c == alias)
    }
}

impl Dimension {
    pub fn new<I, S>(name: &str, primary_key_alias: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut attributes: Vec<String> = attributes.into_iter().map(Into::into).collect();
        if !attributes.iter().any(|a| a == primary_key_alias) {
            attributes.insert(0, primary_key_alias.to_string());
        }
        Self {
            name: name.to_string(),
            public_name: None,
            primary_key_alias: primary_key_alias.to_string(),
            attributes,
            engines: Vec::new(),
        }
    }

    pub fn with_public_name(mut self, public_name: &str) -> Self {
        self.public_name = Some(public_name.to_string());
        self
    }

    pub fn with_engines<I: IntoIterator<Item = Engine>>(mut self, engines: I) -> Self {
        self.engines.extend(engines);
        self
    }

    pub fn public_name(&self) -> &str {
        self.public_name.as_deref().unwrap_or(&self.name)
    }

    pub fn has_attribute(&self, alias: &str) -> bool {
        self.attributes.iter().any(|a| a == alias)
    }

    pub fn serves(&self, engine: Engine) -> bool {
        self.engines.contains(&engine)
    }
}
