//! Default cost-based planner.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{DimensionCandidate, PlanError, PlanResult, QueryAttributes, QueryPipeline, QueryPlanner};
use crate::config::Engine;
use crate::model::RequestModel;
use crate::registry::{Cube, Dimension, Fact, Registry};

/// Picks the cheapest fact of the selected revision, then the dimensions
/// the fact cannot answer on its own.
#[derive(Debug, Clone, Default)]
pub struct DefaultQueryPlanner {
    engine_attributes: HashMap<Engine, QueryAttributes>,
}

impl DefaultQueryPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach execution hints to every pipeline targeting `engine`.
    pub fn with_engine_attributes(mut self, engine: Engine, attributes: QueryAttributes) -> Self {
        self.engine_attributes.insert(engine, attributes);
        self
    }

    fn select_fact<'a>(
        &self,
        registry: &'a Registry,
        cube: &'a Cube,
        model: &RequestModel,
    ) -> PlanResult<(&'a Fact, Vec<&'a Dimension>)> {
        cube.facts
            .iter()
            .filter(|fact| fact.revision == model.revision())
            .filter(|fact| model.fact_aliases().iter().all(|a| fact.has_column(a)))
            .filter(|fact| model.engine_hint().map_or(true, |hint| hint == fact.engine))
            .filter_map(|fact| {
                let dimensions = needed_dimensions(registry, model, Some(fact));
                dimensions
                    .iter()
                    .all(|d| d.serves(fact.engine))
                    .then_some((fact, dimensions))
            })
            .min_by_key(|(fact, _)| (fact.cost, fact.engine))
            .ok_or_else(|| PlanError::NoFactCandidate {
                cube: cube.name.clone(),
                revision: model.revision(),
            })
    }

    fn select_engine(&self, model: &RequestModel, dimensions: &[&Dimension]) -> PlanResult<Engine> {
        let mut engines = Engine::ALL
            .into_iter()
            .filter(|engine| dimensions.iter().all(|d| d.serves(*engine)))
            .filter(|engine| model.engine_hint().map_or(true, |hint| hint == *engine))
            .peekable();

        let first = engines
            .peek()
            .copied()
            .ok_or_else(|| PlanError::NoEngine(model.cube().to_string()))?;

        if model.include_row_count() {
            if let Some(engine) = engines.find(Engine::supports_row_count) {
                return Ok(engine);
            }
        }
        Ok(first)
    }
}

/// Dimensions the query has to join, in reference order.
///
/// Dimension-driven queries are anchored on every referenced dimension.
/// Otherwise a dimension is only needed for non-key attributes, or for a
/// key the fact does not carry.
fn needed_dimensions<'a>(
    registry: &'a Registry,
    model: &RequestModel,
    fact: Option<&Fact>,
) -> Vec<&'a Dimension> {
    model
        .dimension_refs()
        .iter()
        .filter_map(|r| {
            let dimension = registry.dimension(&r.dimension)?;
            let needed = model.is_dimension_driven()
                || r.has_non_key
                || fact.map_or(true, |f| !f.has_column(&dimension.primary_key_alias));
            needed.then_some(dimension)
        })
        .collect()
}

impl QueryPlanner for DefaultQueryPlanner {
    fn plan(&self, registry: &Registry, model: Arc<RequestModel>) -> PlanResult<QueryPipeline> {
        let cube = registry
            .cube(model.cube())
            .ok_or_else(|| PlanError::UnknownCube(model.cube().to_string()))?;

        let needs_fact = !model.is_dimension_driven() || !model.fact_aliases().is_empty();
        let (engine, fact, dimensions) = if needs_fact {
            let (fact, dimensions) = self.select_fact(registry, cube, &model)?;
            (fact.engine, Some(fact.name.as_str()), dimensions)
        } else {
            let dimensions = needed_dimensions(registry, &model, None);
            if dimensions.is_empty() {
                return Err(PlanError::NoDimensionCandidates(cube.name.clone()));
            }
            (self.select_engine(&model, &dimensions)?, None, dimensions)
        };

        if model.is_dimension_driven() && dimensions.is_empty() {
            return Err(PlanError::NoDimensionCandidates(cube.name.clone()));
        }

        let limit = registry.max_rows(engine);
        if model.max_rows() > limit {
            return Err(PlanError::MaxRowsExceeded {
                engine,
                requested: model.max_rows(),
                limit,
            });
        }

        let mut pipeline = QueryPipeline::new(engine, model);
        if let Some(fact) = fact {
            pipeline = pipeline.with_fact(fact);
        }
        for dimension in dimensions {
            pipeline = pipeline.with_dim_candidate(DimensionCandidate::from(dimension));
        }
        if let Some(attributes) = self.engine_attributes.get(&engine) {
            pipeline = pipeline.with_attributes(attributes.clone());
        }

        debug!(cube = %cube.name, pipeline = %pipeline, "Planned request");
        Ok(pipeline)
    }
}
