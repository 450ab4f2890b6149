use std::sync::Arc;

use curator::config::Engine;
use curator::model::{DriveStrategy, ModelOptions, ReportingRequest, RequestModel};
use curator::planner::{DefaultQueryPlanner, PlanError, PlanResult, QueryAttributes, QueryPipeline, QueryPlanner};
use curator::registry::{Cube, Dimension, Fact, Registry};

/// Two revisions, each with an Oracle and a Druid fact of different cost.
/// `publisher` is only served by Oracle.
fn registry() -> Registry {
    let columns = ["Advertiser ID", "Publisher ID", "Impressions"];
    Registry::new("reporting")
        .with_engine_limit(Engine::Druid, 1000)
        .with_engine_limit(Engine::Oracle, 5000)
        .with_dimension(
            Dimension::new("advertiser", "Advertiser ID", ["Advertiser Name"])
                .with_engines([Engine::Oracle, Engine::Druid]),
        )
        .with_dimension(
            Dimension::new("publisher", "Publisher ID", ["Publisher Name"]).with_engines([Engine::Oracle]),
        )
        .with_cube(
            Cube::new("performance")
                .with_dimensions(["advertiser", "publisher"])
                .with_fact(Fact::new("ad_stats_oracle", Engine::Oracle, columns).with_cost(200))
                .with_fact(Fact::new("ad_stats_druid", Engine::Druid, columns).with_cost(50))
                .with_fact(
                    Fact::new("ad_stats_oracle_v1", Engine::Oracle, columns)
                        .with_revision(1)
                        .with_cost(10),
                )
                .with_fact(
                    Fact::new("ad_stats_druid_v1", Engine::Druid, columns)
                        .with_revision(1)
                        .with_cost(50),
                ),
        )
}

fn plan_with(
    planner: &DefaultQueryPlanner,
    request: ReportingRequest,
    options: ModelOptions,
) -> PlanResult<QueryPipeline> {
    let registry = registry();
    let model = RequestModel::resolve(&registry, Arc::new(request), options).unwrap();
    planner.plan(&registry, Arc::new(model))
}

fn plan(request: ReportingRequest, options: ModelOptions) -> PlanResult<QueryPipeline> {
    plan_with(&DefaultQueryPlanner::new(), request, options)
}

fn advertiser_report() -> ReportingRequest {
    ReportingRequest::new("performance", ["Advertiser Name", "Impressions"])
}

fn revision(revision: u32) -> ModelOptions {
    ModelOptions {
        revision: Some(revision),
        engine_hint: None,
    }
}

#[test]
fn test_default_revision_uses_cheapest_fact() {
    let pipeline = plan(advertiser_report(), ModelOptions::default()).unwrap();

    assert_eq!(pipeline.engine, Engine::Druid);
    assert_eq!(pipeline.fact.as_deref(), Some("ad_stats_druid"));
    assert_eq!(pipeline.drive, DriveStrategy::FactDriven);
    insta::assert_snapshot!(pipeline.to_string(), @"druid fact-driven fact=ad_stats_druid dims=[advertiser]");
}

#[test]
fn test_revision_selects_its_own_facts() {
    let pipeline = plan(advertiser_report(), revision(1)).unwrap();

    assert_eq!(pipeline.engine, Engine::Oracle);
    assert_eq!(pipeline.fact.as_deref(), Some("ad_stats_oracle_v1"));
    assert_eq!(pipeline.request_model.revision(), 1);
}

#[test]
fn test_engine_hint_pins_fact() {
    let pipeline = plan(
        advertiser_report(),
        ModelOptions {
            revision: None,
            engine_hint: Some(Engine::Oracle),
        },
    )
    .unwrap();

    assert_eq!(pipeline.fact.as_deref(), Some("ad_stats_oracle"));
}

#[test]
fn test_dimension_engines_restrict_facts() {
    // publisher is Oracle-only, so the cheaper Druid fact is not eligible
    let pipeline = plan(
        ReportingRequest::new("performance", ["Publisher Name", "Impressions"]),
        ModelOptions::default(),
    )
    .unwrap();

    assert_eq!(pipeline.engine, Engine::Oracle);
    assert_eq!(pipeline.fact.as_deref(), Some("ad_stats_oracle"));
    let keys: Vec<&str> = pipeline.primary_key_aliases().collect();
    assert_eq!(keys, vec!["Publisher ID"]);
}

#[test]
fn test_keys_on_fact_skip_dimension_join() {
    let pipeline = plan(
        ReportingRequest::new("performance", ["Advertiser ID", "Impressions"]),
        ModelOptions::default(),
    )
    .unwrap();

    assert!(pipeline.best_dim_candidates.is_empty());
}

#[test]
fn test_max_rows_exceeded() {
    let err = plan(advertiser_report().with_pagination(900, 200), ModelOptions::default()).unwrap_err();

    assert_eq!(
        err,
        PlanError::MaxRowsExceeded {
            engine: Engine::Druid,
            requested: 1100,
            limit: 1000,
        }
    );
}

#[test]
fn test_dimension_driven_without_fact() {
    let pipeline = plan(
        ReportingRequest::new("performance", ["Advertiser Name"]).with_row_count(),
        ModelOptions::default(),
    )
    .unwrap();

    assert_eq!(pipeline.drive, DriveStrategy::DimensionDriven);
    assert_eq!(pipeline.fact, None);
    assert!(pipeline.engine.supports_row_count());
    assert_eq!(pipeline.best_dim_candidates[0].name, "advertiser");
}

#[test]
fn test_dimension_driven_needs_candidates() {
    let mut request = ReportingRequest::new("performance", ["Impressions"]);
    request.force_dimension_driven = true;

    let err = plan(request, ModelOptions::default()).unwrap_err();
    assert_eq!(err, PlanError::NoDimensionCandidates("performance".to_string()));
}

#[test]
fn test_no_fact_for_pinned_engine() {
    let err = plan(
        advertiser_report(),
        ModelOptions {
            revision: Some(1),
            engine_hint: Some(Engine::Hive),
        },
    )
    .unwrap_err();

    assert_eq!(
        err,
        PlanError::NoFactCandidate {
            cube: "performance".to_string(),
            revision: 1,
        }
    );
}

#[test]
fn test_engine_attributes_attached() {
    let planner = DefaultQueryPlanner::new()
        .with_engine_attributes(Engine::Druid, QueryAttributes::new().with("priority", "high"));

    let pipeline = plan_with(&planner, advertiser_report(), ModelOptions::default()).unwrap();
    assert_eq!(pipeline.attributes.get("priority"), Some("high"));

    let pipeline = plan_with(&planner, advertiser_report(), revision(1)).unwrap();
    assert!(pipeline.attributes.is_empty());
}
