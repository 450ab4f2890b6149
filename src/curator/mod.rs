//! Curators - execute one resolved plan end to end.
//!
//! A curator resolves the request into a model, plans it, runs the plan on
//! the execution context and, when asked, computes the total row count.
//! Every failure is captured in the returned [`CuratorResult`].
//!
//! ```text
//! ReportingRequest ──► RequestModel ──► QueryPipeline ──► RowList
//!                                                           │
//!                            include_row_count? ──► inline TOTALROWS
//!                                                   | TotalRowsPlanner
//!                                                   | start + rows
//! ```

pub mod accumulator;
mod default;
pub mod total_rows;

pub use accumulator::{
    accumulate_rows, AccumulatorError, AccumulatorResult, ResultAccumulator, RowCountAccumulator,
};
pub use default::DefaultCurator;
pub use total_rows::{
    derive_total_rows_request, TotalRowsError, TotalRowsPlanner, TotalRowsResult, ROW_COUNT_ALIAS,
};

use std::sync::Arc;

use crate::bucket::BucketVariant;
use crate::execution::ExecutionError;
use crate::logging::RequestLogHelper;
use crate::model::{ReportingRequest, RequestModel, RequestModelError, RequestResult};
use crate::planner::PlanError;

/// Failures captured by a curator.
#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    #[error("Unknown registry '{0}'")]
    UnknownRegistry(String),

    #[error("Invalid request: {0}")]
    Model(#[from] RequestModelError),

    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Total rows failed: {0}")]
    TotalRows(#[from] TotalRowsError),

    #[error("Invalid inline row count: {0}")]
    RowCount(#[from] AccumulatorError),
}

/// Outcome of one curator execution.
///
/// The request model is absent only when resolution failed before a model
/// existed.
#[derive(Debug)]
pub struct CuratorResult {
    curator: &'static str,
    request_model: Option<Arc<RequestModel>>,
    result: Result<RequestResult, CuratorError>,
}

impl CuratorResult {
    pub fn success(curator: &'static str, request_model: Arc<RequestModel>, result: RequestResult) -> Self {
        Self {
            curator,
            request_model: Some(request_model),
            result: Ok(result),
        }
    }

    pub fn failure(
        curator: &'static str,
        request_model: Option<Arc<RequestModel>>,
        error: CuratorError,
    ) -> Self {
        Self {
            curator,
            request_model,
            result: Err(error),
        }
    }

    pub fn curator(&self) -> &'static str {
        self.curator
    }

    pub fn request_model(&self) -> Option<&Arc<RequestModel>> {
        self.request_model.as_ref()
    }

    pub fn result(&self) -> &Result<RequestResult, CuratorError> {
        &self.result
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_parts(self) -> (Option<Arc<RequestModel>>, Result<RequestResult, CuratorError>) {
        (self.request_model, self.result)
    }
}

/// Executes one variant of a request.
///
/// Implementations never panic past this boundary by contract and block
/// the calling thread while the backend runs.
pub trait Curator: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        registry_name: &str,
        variant: &BucketVariant,
        request: Arc<ReportingRequest>,
        log: &RequestLogHelper,
    ) -> CuratorResult;
}
