//! Backend execution context.
//!
//! Routes a [`QueryPipeline`] to the executor registered for its engine.
//!
//! ```text
//! QueryPipeline ──► ExecutionContext ──► executors[engine] ──► RowList
//!                                         ├── RowStoreExecutor (SQLite)
//!                                         └── any QueryExecutor impl
//! ```

mod row_store;

pub use row_store::{RowStoreExecutor, Statement, StatementRenderer};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::Engine;
use crate::data_access::DataAccessError;
use crate::model::RowList;
use crate::planner::{QueryAttributes, QueryPipeline};

/// Errors raised while executing a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("No executor registered for engine {0}")]
    NoExecutor(Engine),

    #[error("Failed to render statement: {0}")]
    Render(String),

    #[error("Data access failed: {0}")]
    DataAccess(#[from] DataAccessError),

    #[error("Backend {engine} failed: {message}")]
    Backend { engine: Engine, message: String },
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Runs pipelines against one backend engine.
///
/// Implementations block the calling thread for the duration of the query.
pub trait QueryExecutor: Send + Sync {
    fn engine(&self) -> Engine;

    fn execute(
        &self,
        pipeline: &QueryPipeline,
        attributes: &QueryAttributes,
    ) -> ExecutionResult<RowList>;
}

/// Executors keyed by engine.
#[derive(Default, Clone)]
pub struct ExecutionContext {
    executors: HashMap<Engine, Arc<dyn QueryExecutor>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its engine, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn QueryExecutor>) {
        self.executors.insert(executor.engine(), executor);
    }

    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.register(executor);
        self
    }

    /// Execute a pipeline with its own attributes.
    pub fn execute(&self, pipeline: &QueryPipeline) -> ExecutionResult<RowList> {
        let executor = self
            .executors
            .get(&pipeline.engine)
            .ok_or(ExecutionError::NoExecutor(pipeline.engine))?;
        let rows = executor.execute(pipeline, &pipeline.attributes)?;
        debug!(engine = %pipeline.engine, rows = rows.len(), "Executed pipeline");
        Ok(rows)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut engines: Vec<&Engine> = self.executors.keys().collect();
        engines.sort();
        f.debug_struct("ExecutionContext")
            .field("engines", &engines)
            .finish()
    }
}
