//! Query planner - selects the engine, drive strategy and dimensions that
//! answer a request model.
//!
//! ```text
//! RequestModel ──► fact selection ──► dimension selection ──► engine ──► ceiling
//!                  (rev, columns,     (non-key attrs,         (fact or    check
//!                   hint, cost)        uncovered keys)         dim ∩)
//! ```

mod default;
mod pipeline;

pub use default::DefaultQueryPlanner;
pub use pipeline::{DimensionCandidate, QueryAttributes, QueryPipeline};

use std::sync::Arc;

use thiserror::Error;

use crate::config::Engine;
use crate::model::RequestModel;
use crate::registry::Registry;

/// Errors that can occur during planning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Unknown cube '{0}'")]
    UnknownCube(String),

    #[error("No fact of cube '{cube}' at revision {revision} serves the requested fields")]
    NoFactCandidate { cube: String, revision: u32 },

    #[error("Dimension-driven request on cube '{0}' resolves no dimension candidates")]
    NoDimensionCandidates(String),

    #[error("No engine serves every dimension requested from cube '{0}'")]
    NoEngine(String),

    #[error("Requested {requested} rows exceeds the {engine} limit of {limit}")]
    MaxRowsExceeded {
        engine: Engine,
        requested: u64,
        limit: u64,
    },
}

pub type PlanResult<T> = Result<T, PlanError>;

/// Turns a request model into a query pipeline.
pub trait QueryPlanner: Send + Sync {
    fn plan(&self, registry: &Registry, model: Arc<RequestModel>) -> PlanResult<QueryPipeline>;
}
