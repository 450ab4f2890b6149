//! Default curator.

use std::sync::Arc;

use tracing::{debug, warn};

use super::accumulator::{accumulate_rows, RowCountAccumulator};
use super::total_rows::{TotalRowsPlanner, ROW_COUNT_ALIAS};
use super::{Curator, CuratorError, CuratorResult};
use crate::bucket::BucketVariant;
use crate::execution::ExecutionContext;
use crate::logging::RequestLogHelper;
use crate::model::{ModelOptions, ReportingRequest, RequestModel, RequestResult, RowList};
use crate::planner::{QueryPipeline, QueryPlanner};
use crate::registry::{Registry, RegistryProvider};

const NAME: &str = "default";

/// Plans and executes a request, computing total rows when asked.
pub struct DefaultCurator {
    registries: Arc<dyn RegistryProvider>,
    planner: Arc<dyn QueryPlanner>,
    context: Arc<ExecutionContext>,
    total_rows: TotalRowsPlanner,
}

impl DefaultCurator {
    pub fn new(
        registries: Arc<dyn RegistryProvider>,
        planner: Arc<dyn QueryPlanner>,
        context: Arc<ExecutionContext>,
        total_rows: TotalRowsPlanner,
    ) -> Self {
        Self {
            registries,
            planner,
            context,
            total_rows,
        }
    }

    fn run(
        &self,
        registry: &Registry,
        model: &Arc<RequestModel>,
        log: &RequestLogHelper,
    ) -> Result<RequestResult, CuratorError> {
        let pipeline = self.planner.plan(registry, model.clone())?;
        log.set_engine(pipeline.engine);
        if let Some(fact) = &pipeline.fact {
            log.set_fact(fact);
        }

        let rows = self.context.execute(&pipeline)?;
        log.set_row_count(rows.len());

        let mut result = RequestResult::new(rows, pipeline.engine);
        if model.include_row_count() {
            let total = self.total_rows(registry, model, &pipeline, &result.rows)?;
            log.set_total_rows(total);
            result = result.with_total_rows(total);
        }
        Ok(result)
    }

    fn total_rows(
        &self,
        registry: &Registry,
        model: &RequestModel,
        pipeline: &QueryPipeline,
        rows: &RowList,
    ) -> Result<u64, CuratorError> {
        // each row carries a partial count; every row must have one
        if rows.rows.first().is_some_and(|row| row.contains(ROW_COUNT_ALIAS)) {
            return Ok(accumulate_rows(RowCountAccumulator::new(ROW_COUNT_ALIAS), rows)?);
        }

        let pagination = model.request().pagination;
        let fetched = rows.len() as u64;
        if pagination.start_index > 0 || fetched >= pagination.rows_per_page {
            debug!(cube = %model.cube(), "Re-planning for total rows");
            return Ok(self
                .total_rows
                .compute_total_rows(model, pipeline, registry, &self.context)?);
        }

        Ok(pagination.start_index + fetched)
    }
}

impl Curator for DefaultCurator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn execute(
        &self,
        registry_name: &str,
        variant: &BucketVariant,
        request: Arc<ReportingRequest>,
        log: &RequestLogHelper,
    ) -> CuratorResult {
        log.set_curator(NAME);

        let Some(registry) = self.registries.get(registry_name) else {
            return CuratorResult::failure(
                NAME,
                None,
                CuratorError::UnknownRegistry(registry_name.to_string()),
            );
        };

        let options = ModelOptions {
            revision: variant.revision,
            engine_hint: variant.engine,
        };
        let model = match RequestModel::resolve(&registry, request, options) {
            Ok(model) => Arc::new(model),
            Err(e) => return CuratorResult::failure(NAME, None, e.into()),
        };
        log.set_revision(model.revision());

        match self.run(&registry, &model, log) {
            Ok(result) => CuratorResult::success(NAME, model, result),
            Err(e) => {
                warn!(cube = %model.cube(), error = %e, "Curator failed");
                CuratorResult::failure(NAME, Some(model), e)
            }
        }
    }
}
