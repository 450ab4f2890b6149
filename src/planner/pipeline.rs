//! Query pipelines - resolved execution plans.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Engine;
use crate::model::{DriveStrategy, RequestModel};
use crate::registry::Dimension;

/// Engine-specific execution hints, passed opaquely to the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryAttributes(BTreeMap<String, String>);

impl QueryAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// A dimension table selected to serve the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionCandidate {
    pub name: String,
    pub public_name: String,
    pub primary_key_alias: String,
}

impl From<&Dimension> for DimensionCandidate {
    fn from(dimension: &Dimension) -> Self {
        Self {
            name: dimension.name.clone(),
            public_name: dimension.public_name().to_string(),
            primary_key_alias: dimension.primary_key_alias.clone(),
        }
    }
}

/// The resolved plan for one request model.
#[derive(Debug, Clone)]
pub struct QueryPipeline {
    pub engine: Engine,
    pub drive: DriveStrategy,
    /// Fact table anchoring or joined into the query, if any.
    pub fact: Option<String>,
    /// Dimensions serving the request, in reference order.
    pub best_dim_candidates: Vec<DimensionCandidate>,
    pub attributes: QueryAttributes,
    pub request_model: Arc<RequestModel>,
}

impl QueryPipeline {
    /// A pipeline with no fact and no dimension candidates.
    pub fn new(engine: Engine, request_model: Arc<RequestModel>) -> Self {
        Self {
            engine,
            drive: request_model.drive(),
            fact: None,
            best_dim_candidates: Vec::new(),
            attributes: QueryAttributes::default(),
            request_model,
        }
    }

    pub fn with_fact(mut self, fact: &str) -> Self {
        self.fact = Some(fact.to_string());
        self
    }

    pub fn with_dim_candidate(mut self, candidate: DimensionCandidate) -> Self {
        self.best_dim_candidates.push(candidate);
        self
    }

    pub fn with_attributes(mut self, attributes: QueryAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Primary-key aliases of the dimension candidates, in candidate order.
    pub fn primary_key_aliases(&self) -> impl Iterator<Item = &str> {
        self.best_dim_candidates
            .iter()
            .map(|c| c.primary_key_alias.as_str())
    }
}

impl fmt::Display for QueryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.engine, self.drive)?;
        if let Some(fact) = &self.fact {
            write!(f, " fact={}", fact)?;
        }
        let dims: Vec<&str> = self
            .best_dim_candidates
            .iter()
            .map(|c| c.public_name.as_str())
            .collect();
        write!(f, " dims=[{}]", dims.join(", "))
    }
}
