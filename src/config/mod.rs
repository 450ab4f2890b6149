//! Configuration module.
//!
//! Handles engine identities, environment variables, and settings.

mod engine;
mod settings;

pub use engine::{Engine, UnknownEngine};
pub use settings::{
    expand_env_vars, ConnectionSettings, CubeBucketSettings, DryRunWeight, EngineSettings,
    RegistrySettings, RevisionWeight, Settings, SettingsError, TotalRowsSettings,
};
