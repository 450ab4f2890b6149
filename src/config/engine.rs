//! Backend query engines.
//!
//! Every fact and dimension in a registry declares which engines can serve
//! it. The planner picks one engine per pipeline and the execution context
//! routes the pipeline to the executor registered for that engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when an engine name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported engine: {0}. Supported: oracle, postgres, druid, hive, presto, bigquery")]
pub struct UnknownEngine(pub String);

/// Supported backend engines.
///
/// The declaration order doubles as the planner's tie-break preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Row-oriented relational store.
    Oracle,
    /// Row-oriented relational store.
    Postgres,
    /// Columnar OLAP store.
    Druid,
    /// Batch warehouse.
    Hive,
    /// Federated SQL engine.
    Presto,
    /// Hosted warehouse.
    #[serde(rename = "bigquery")]
    BigQuery,
}

impl Engine {
    /// All engines in preference order.
    pub const ALL: [Engine; 6] = [
        Engine::Oracle,
        Engine::Postgres,
        Engine::Druid,
        Engine::Hive,
        Engine::Presto,
        Engine::BigQuery,
    ];

    /// Get the canonical engine name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Oracle => "oracle",
            Engine::Postgres => "postgres",
            Engine::Druid => "druid",
            Engine::Hive => "hive",
            Engine::Presto => "presto",
            Engine::BigQuery => "bigquery",
        }
    }

    /// Whether the engine reports total row counts under the reserved
    /// row-count alias.
    ///
    /// Only the row-oriented stores do; every other engine needs a separate
    /// total-rows query routed to a row store.
    pub fn supports_row_count(&self) -> bool {
        matches!(self, Engine::Oracle | Engine::Postgres)
    }
}

impl FromStr for Engine {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oracle" => Ok(Engine::Oracle),
            "postgres" | "postgresql" | "pg" => Ok(Engine::Postgres),
            "druid" => Ok(Engine::Druid),
            "hive" => Ok(Engine::Hive),
            "presto" | "trino" => Ok(Engine::Presto),
            "bigquery" | "bq" => Ok(Engine::BigQuery),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
