#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{catalog, report_rows, FnExecutor, RecordingLogWriter};
use curator::bucket::{BucketParams, DefaultBucketSelector, WeightedBucketSelector};
use curator::config::{Engine, Settings};
use curator::coordinator::{DefaultRequestCoordinator, RequestCoordinator};
use curator::curator::{DefaultCurator, TotalRowsPlanner};
use curator::execution::ExecutionContext;
use curator::logging::{LogStatus, RequestLogHelper, RequestLogRecord, RequestType};
use curator::planner::{DefaultQueryPlanner, QueryPlanner};
use curator::registry::RegistryCatalog;

/// Druid executor that panics whenever the revision 1 fact is planned.
fn druid() -> Arc<FnExecutor> {
    let rows = report_rows(4);
    FnExecutor::new(Engine::Druid, move |pipeline| {
        if pipeline.fact.as_deref() == Some("ad_stats_v1") {
            panic!("ad_stats_v1 segment missing");
        }
        Ok(rows.clone())
    })
}

fn curator(registries: Arc<RegistryCatalog>, druid: Arc<FnExecutor>) -> Arc<DefaultCurator> {
    let planner: Arc<dyn QueryPlanner> = Arc::new(DefaultQueryPlanner::new());
    Arc::new(DefaultCurator::new(
        registries,
        planner.clone(),
        Arc::new(ExecutionContext::new().with_executor(druid)),
        TotalRowsPlanner::new(planner, Engine::Oracle),
    ))
}

fn coordinator(druid: Arc<FnExecutor>) -> DefaultRequestCoordinator {
    let registries = catalog(common::registry());
    DefaultRequestCoordinator::new(
        Arc::new(DefaultBucketSelector::new(registries.clone())),
        curator(registries, druid),
    )
}

fn opened_log(writer: &Arc<RecordingLogWriter>) -> RequestLogHelper {
    let log = RequestLogHelper::new(writer.clone());
    log.init(&common::performance_request(), RequestType::Sync, b"{}");
    log
}

/// The dry run is detached; poll until its record is closed.
async fn wait_for_records(writer: &RecordingLogWriter, count: usize) -> Vec<RequestLogRecord> {
    for _ in 0..200 {
        let records = writer.records();
        if records.len() >= count {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} closed records, got {}", count, writer.records().len());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_panic_does_not_touch_primary() {
    let druid = druid();
    let writer = Arc::new(RecordingLogWriter::default());
    let log = opened_log(&writer);

    let result = coordinator(druid.clone())
        .execute(
            "reporting",
            BucketParams::new().force_dry_run(Some(1), None),
            Arc::new(common::performance_request()),
            log.clone(),
        )
        .await
        .unwrap();

    let (model, result) = result.into_parts();
    assert_eq!(model.unwrap().revision(), 0);
    assert_eq!(result.unwrap().rows.len(), 4);

    let records = wait_for_records(&writer, 1).await;
    assert_eq!(records.len(), 1);
    let dry_run = &records[0];
    assert_eq!(dry_run.request_type, RequestType::DryRun);
    assert_eq!(dry_run.status, LogStatus::Failed);
    assert_eq!(dry_run.parent_id, Some(log.request_id()));
    assert_eq!(dry_run.revision, Some(1));
    assert!(dry_run.error.as_deref().unwrap().contains("ad_stats_v1 segment missing"));

    // the primary record is still open for the processor to close
    assert!(!log.is_closed());
    assert_eq!(log.snapshot().fact.as_deref(), Some("ad_stats"));
    assert_eq!(druid.calls(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_failure_is_logged_separately() {
    let writer = Arc::new(RecordingLogWriter::default());
    let log = opened_log(&writer);

    // no Oracle fact carries Impressions, so the pinned dry run cannot plan
    let result = coordinator(druid())
        .execute(
            "reporting",
            BucketParams::new().force_dry_run(None, Some(Engine::Oracle)),
            Arc::new(common::performance_request()),
            log.clone(),
        )
        .await
        .unwrap();

    assert!(result.is_success());

    let records = wait_for_records(&writer, 1).await;
    let dry_run = &records[0];
    assert_eq!(dry_run.status, LogStatus::Failed);
    assert_eq!(dry_run.parent_id, Some(log.request_id()));
    assert!(dry_run.error.as_deref().unwrap().contains("Planning failed"));
    assert_ne!(dry_run.request_id, log.request_id());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_successful_dry_run_closes_forked_record() {
    let writer = Arc::new(RecordingLogWriter::default());
    let log = opened_log(&writer);

    let result = coordinator(FnExecutor::returning(Engine::Druid, report_rows(2)))
        .execute(
            "reporting",
            BucketParams::new().force_dry_run(Some(1), None),
            Arc::new(common::performance_request()),
            log.clone(),
        )
        .await
        .unwrap();
    assert!(result.is_success());

    let records = wait_for_records(&writer, 1).await;
    assert_eq!(records[0].status, LogStatus::Success);
    assert_eq!(records[0].fact.as_deref(), Some("ad_stats_v1"));
    assert_eq!(records[0].row_count, Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_weighted_selector_routes_dry_run() {
    let settings = Settings::from_toml(
        r#"
[buckets.performance]
revisions = [{ revision = 0, percent = 100 }]
dry_runs = [{ revision = 1, percent = 100 }]
"#,
    )
    .unwrap();
    let registries = catalog(common::registry());
    let druid = druid();
    let coordinator = DefaultRequestCoordinator::new(
        Arc::new(WeightedBucketSelector::from_settings(&settings).unwrap()),
        curator(registries, druid.clone()),
    );
    let writer = Arc::new(RecordingLogWriter::default());
    let log = opened_log(&writer);

    let result = coordinator
        .execute(
            "reporting",
            BucketParams::new().for_user("u-17"),
            Arc::new(common::performance_request()),
            log.clone(),
        )
        .await
        .unwrap();

    assert!(result.is_success());
    let records = wait_for_records(&writer, 1).await;
    assert_eq!(records[0].request_type, RequestType::DryRun);
    assert_eq!(records[0].status, LogStatus::Failed);
    assert_eq!(records[0].parent_id, Some(log.request_id()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_dry_run_without_selection() {
    let writer = Arc::new(RecordingLogWriter::default());
    let druid = FnExecutor::returning(Engine::Druid, report_rows(1));

    let result = coordinator(druid.clone())
        .execute(
            "reporting",
            BucketParams::new(),
            Arc::new(common::performance_request()),
            opened_log(&writer),
        )
        .await
        .unwrap();

    assert!(result.is_success());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(writer.records().is_empty());
    assert_eq!(druid.calls(), 1);
}
