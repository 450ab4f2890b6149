//! Row-store executor backed by a SQLite data source.

use std::sync::Arc;

use tracing::debug;

use super::{ExecutionResult, QueryExecutor};
use crate::config::Engine;
use crate::data_access::{SqlArg, SqliteDataSource};
use crate::model::RowList;
use crate::planner::{QueryAttributes, QueryPipeline};

/// A rendered statement with positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn bind(mut self, arg: impl Into<SqlArg>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Renders a pipeline into an engine-specific statement.
pub trait StatementRenderer: Send + Sync {
    fn render(
        &self,
        pipeline: &QueryPipeline,
        attributes: &QueryAttributes,
    ) -> ExecutionResult<Statement>;
}

impl<F> StatementRenderer for F
where
    F: Fn(&QueryPipeline, &QueryAttributes) -> ExecutionResult<Statement> + Send + Sync,
{
    fn render(
        &self,
        pipeline: &QueryPipeline,
        attributes: &QueryAttributes,
    ) -> ExecutionResult<Statement> {
        self(pipeline, attributes)
    }
}

/// Executes rendered statements against a row-oriented store.
pub struct RowStoreExecutor {
    engine: Engine,
    data_source: Arc<SqliteDataSource>,
    renderer: Arc<dyn StatementRenderer>,
}

impl RowStoreExecutor {
    pub fn new(
        engine: Engine,
        data_source: Arc<SqliteDataSource>,
        renderer: Arc<dyn StatementRenderer>,
    ) -> Self {
        Self {
            engine,
            data_source,
            renderer,
        }
    }
}

impl QueryExecutor for RowStoreExecutor {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn execute(
        &self,
        pipeline: &QueryPipeline,
        attributes: &QueryAttributes,
    ) -> ExecutionResult<RowList> {
        let statement = self.renderer.render(pipeline, attributes)?;
        debug!(engine = %self.engine, sql = %statement.sql, args = statement.args.len(), "Running statement");
        Ok(self.data_source.query_rows(&statement.sql, &statement.args)?)
    }
}
