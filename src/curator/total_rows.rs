//! Total-rows re-planning.
//!
//! When a paginated result needs the total number of matching rows, the
//! request is narrowed to the primary keys of the dimensions the primary
//! plan resolved, re-planned against a row store and counted.
//!
//! ```text
//! original request ──► derive_total_rows_request ──► RequestModel::resolve
//!   + source pipeline      (pk fields, no sort,           │
//!                           row count, dim-driven)         ▼
//!                                               ceiling check ──► plan ──► execute
//!                                                                           │
//!                                                         RowCountAccumulator ◄┘
//! ```

use std::sync::Arc;

use tracing::debug;

use super::accumulator::{accumulate_rows, AccumulatorError, RowCountAccumulator};
use crate::config::{Engine, Settings, SettingsError};
use crate::execution::{ExecutionContext, ExecutionError};
use crate::model::{
    Field, ModelOptions, Pagination, ReportingRequest, RequestModel, RequestModelError,
};
use crate::planner::{PlanError, QueryPipeline, QueryPlanner};
use crate::registry::Registry;

/// Alias under which row stores report the total row count.
pub const ROW_COUNT_ALIAS: &str = "TOTALROWS";

/// Errors raised while computing total rows.
#[derive(Debug, thiserror::Error)]
pub enum TotalRowsError {
    #[error("Cannot derive a total-rows request from a pipeline without dimension candidates: {request}")]
    MissingDimensionCandidates { request: String },

    #[error("Failed to resolve total-rows request: {0}")]
    Model(#[from] RequestModelError),

    #[error("Total-rows request asks for {requested} rows, above the {engine} limit of {limit}")]
    MaxRowsExceeded {
        engine: Engine,
        requested: u64,
        limit: u64,
    },

    #[error("Failed to plan total-rows request: {0}")]
    Plan(#[from] PlanError),

    #[error("Failed to execute total-rows request: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Failed to count total rows: {0}")]
    Accumulate(#[from] AccumulatorError),
}

pub type TotalRowsResult<T> = Result<T, TotalRowsError>;

/// Derive the request that counts the rows matching `original`.
///
/// The fields become the primary keys of the pipeline's dimension
/// candidates, in candidate order. Filters are kept, sort is dropped, the
/// window starts at zero and keeps the original page size.
pub fn derive_total_rows_request(
    original: &ReportingRequest,
    pipeline: &QueryPipeline,
) -> TotalRowsResult<ReportingRequest> {
    if pipeline.best_dim_candidates.is_empty() {
        return Err(TotalRowsError::MissingDimensionCandidates {
            request: original.to_string(),
        });
    }

    Ok(ReportingRequest {
        fields: pipeline.primary_key_aliases().map(Field::new).collect(),
        sort: Vec::new(),
        pagination: Pagination {
            start_index: 0,
            ..original.pagination
        },
        include_row_count: true,
        force_dimension_driven: true,
        force_fact_driven: false,
        ..original.clone()
    })
}

/// Re-plans and executes total-rows requests against a row-count engine.
pub struct TotalRowsPlanner {
    planner: Arc<dyn QueryPlanner>,
    row_count_engine: Engine,
}

impl TotalRowsPlanner {
    pub fn new(planner: Arc<dyn QueryPlanner>, row_count_engine: Engine) -> Self {
        Self {
            planner,
            row_count_engine,
        }
    }

    /// Use the engine configured under `[total_rows]`.
    pub fn from_settings(
        planner: Arc<dyn QueryPlanner>,
        settings: &Settings,
    ) -> Result<Self, SettingsError> {
        Ok(Self::new(planner, settings.total_rows.engine()?))
    }

    pub fn row_count_engine(&self) -> Engine {
        self.row_count_engine
    }

    /// Count the rows matching `model`'s request.
    ///
    /// This is an independent plan and execute cycle; nothing from the
    /// primary execution is reused except the source pipeline's dimension
    /// candidates.
    pub fn compute_total_rows(
        &self,
        model: &RequestModel,
        source_pipeline: &QueryPipeline,
        registry: &Registry,
        context: &ExecutionContext,
    ) -> TotalRowsResult<u64> {
        let request = derive_total_rows_request(model.request(), source_pipeline)?;
        let options = ModelOptions {
            revision: Some(model.revision()),
            engine_hint: Some(self.row_count_engine),
        };
        let total_model = RequestModel::resolve(registry, Arc::new(request), options)?;

        let limit = registry.max_rows(self.row_count_engine);
        if total_model.max_rows() > limit {
            return Err(TotalRowsError::MaxRowsExceeded {
                engine: self.row_count_engine,
                requested: total_model.max_rows(),
                limit,
            });
        }

        let pipeline = self.planner.plan(registry, Arc::new(total_model))?;
        let rows = context.execute(&pipeline)?;
        let total = accumulate_rows(RowCountAccumulator::new(ROW_COUNT_ALIAS), &rows)?;

        debug!(
            cube = %model.cube(),
            engine = %pipeline.engine,
            rows = rows.len(),
            total,
            "Computed total rows"
        );
        Ok(total)
    }
}
