//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use curator::config::Engine;
use curator::execution::{ExecutionResult, QueryExecutor};
use curator::logging::{RequestLogRecord, RequestLogWriter};
use curator::model::{ReportingRequest, Row, RowList, Value};
use curator::monitor::ServiceMonitor;
use curator::planner::{QueryAttributes, QueryPipeline};
use curator::registry::{Cube, Dimension, Fact, Registry, RegistryCatalog};
use uuid::Uuid;

/// Registry with two dimensions served by Oracle and Druid, and a Druid
/// fact per revision.
///
/// - `advertiser`: pk `Advertiser ID`, attribute `Advertiser Name`
/// - `campaign`: pk `Campaign ID`, attribute `Campaign Name`
/// - `performance` facts: `ad_stats` (rev 0), `ad_stats_v1` (rev 1)
pub fn registry() -> Registry {
    Registry::new("reporting")
        .with_engine_limit(Engine::Druid, 1000)
        .with_engine_limit(Engine::Oracle, 5000)
        .with_dimension(
            Dimension::new("advertiser", "Advertiser ID", ["Advertiser Name"])
                .with_public_name("advertisers")
                .with_engines([Engine::Oracle, Engine::Druid]),
        )
        .with_dimension(
            Dimension::new("campaign", "Campaign ID", ["Campaign Name"])
                .with_public_name("campaigns")
                .with_engines([Engine::Oracle, Engine::Druid]),
        )
        .with_cube(
            Cube::new("performance")
                .with_dimensions(["advertiser", "campaign"])
                .with_fact(Fact::new(
                    "ad_stats",
                    Engine::Druid,
                    ["Advertiser ID", "Campaign ID", "Impressions", "Clicks"],
                ))
                .with_fact(
                    Fact::new(
                        "ad_stats_v1",
                        Engine::Druid,
                        ["Advertiser ID", "Campaign ID", "Impressions", "Clicks"],
                    )
                    .with_revision(1),
                ),
        )
}

pub fn catalog(registry: Registry) -> Arc<RegistryCatalog> {
    let catalog = RegistryCatalog::new();
    catalog.register(registry).unwrap();
    Arc::new(catalog)
}

pub fn performance_request() -> ReportingRequest {
    ReportingRequest::new("performance", ["Advertiser Name", "Campaign Name", "Impressions"])
}

type Respond = dyn Fn(&QueryPipeline) -> ExecutionResult<RowList> + Send + Sync;

/// Executor answering with a closure and recording every pipeline it ran.
pub struct FnExecutor {
    engine: Engine,
    respond: Box<Respond>,
    calls: AtomicUsize,
    pipelines: Mutex<Vec<QueryPipeline>>,
}

impl FnExecutor {
    pub fn new<F>(engine: Engine, respond: F) -> Arc<Self>
    where
        F: Fn(&QueryPipeline) -> ExecutionResult<RowList> + Send + Sync + 'static,
    {
        Arc::new(Self {
            engine,
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            pipelines: Mutex::new(Vec::new()),
        })
    }

    pub fn returning(engine: Engine, rows: RowList) -> Arc<Self> {
        Self::new(engine, move |_| Ok(rows.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn pipelines(&self) -> Vec<QueryPipeline> {
        self.pipelines.lock().unwrap().clone()
    }
}

impl QueryExecutor for FnExecutor {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn execute(
        &self,
        pipeline: &QueryPipeline,
        _attributes: &QueryAttributes,
    ) -> ExecutionResult<RowList> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pipelines.lock().unwrap().push(pipeline.clone());
        (self.respond)(pipeline)
    }
}

/// `n` rows with the advertiser and campaign names.
pub fn report_rows(n: usize) -> RowList {
    RowList::new(
        vec![
            "Advertiser Name".to_string(),
            "Campaign Name".to_string(),
            "Impressions".to_string(),
        ],
        (0..n)
            .map(|i| {
                Row::new()
                    .with("Advertiser Name", format!("advertiser-{}", i))
                    .with("Campaign Name", format!("campaign-{}", i))
                    .with("Impressions", i as i64 * 10)
            })
            .collect(),
    )
}

/// Rows carrying one partial count each under `TOTALROWS`.
pub fn count_rows(counts: &[i64]) -> RowList {
    RowList::new(
        vec!["Advertiser ID".to_string(), "TOTALROWS".to_string()],
        counts
            .iter()
            .enumerate()
            .map(|(i, count)| {
                Row::new()
                    .with("Advertiser ID", i as i64)
                    .with("TOTALROWS", Value::Int(*count))
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Start(Uuid),
    Stop(Uuid),
}

/// Monitor recording start/stop calls in order.
#[derive(Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingMonitor {
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MonitorEvent::Stop(_)))
            .count()
    }
}

impl ServiceMonitor for RecordingMonitor {
    fn start(&self, request_id: Uuid, _request: &ReportingRequest) {
        self.events.lock().unwrap().push(MonitorEvent::Start(request_id));
    }

    fn stop(&self, request_id: Uuid, _request: &ReportingRequest) {
        self.events.lock().unwrap().push(MonitorEvent::Stop(request_id));
    }
}

/// Log writer keeping every closed record.
#[derive(Default)]
pub struct RecordingLogWriter {
    records: Mutex<Vec<RequestLogRecord>>,
}

impl RecordingLogWriter {
    pub fn records(&self) -> Vec<RequestLogRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl RequestLogWriter for RecordingLogWriter {
    fn write(&self, record: &RequestLogRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
