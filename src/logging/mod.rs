//! Per-request log records.
//!
//! A [`RequestLogHelper`] is created once per processed request. It is
//! initialised with the request, annotated by curators while the request
//! runs, and closed exactly once as either a success or a failure. The
//! closed record is handed to a [`RequestLogWriter`].
//!
//! ```text
//! init ──► set_revision / set_engine / ... ──► log_success | log_failed
//!                                                    │
//!                                                    ▼
//!                                             RequestLogWriter
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Engine;
use crate::model::ReportingRequest;

/// Target the tracing writer emits request-log records on.
pub const REQUEST_LOG_TARGET: &str = "curator::request_log";

/// How the request entered the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[default]
    Sync,
    Async,
    DryRun,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Sync => f.write_str("sync"),
            RequestType::Async => f.write_str("async"),
            RequestType::DryRun => f.write_str("dry_run"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    #[default]
    Open,
    Success,
    Failed,
}

/// One request's log record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestLogRecord {
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub request_type: RequestType,
    pub status: LogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cube: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<Engine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
}

/// Receives closed request-log records.
pub trait RequestLogWriter: Send + Sync {
    fn write(&self, record: &RequestLogRecord);
}

/// Emits each record as one JSON event on [`REQUEST_LOG_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogWriter;

impl RequestLogWriter for TracingLogWriter {
    fn write(&self, record: &RequestLogRecord) {
        match serde_json::to_string(record) {
            Ok(json) => info!(target: REQUEST_LOG_TARGET, request_id = %record.request_id, "{}", json),
            Err(e) => warn!(request_id = %record.request_id, error = %e, "Failed to serialize request log"),
        }
    }
}

/// Handle onto one request's log record.
///
/// Clones share the record. Closing (success or failure) happens at most
/// once across all clones.
#[derive(Clone)]
pub struct RequestLogHelper {
    record: Arc<Mutex<RequestLogRecord>>,
    writer: Arc<dyn RequestLogWriter>,
}

impl fmt::Debug for RequestLogHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogHelper")
            .field("record", &*self.lock())
            .finish()
    }
}

impl RequestLogHelper {
    pub fn new(writer: Arc<dyn RequestLogWriter>) -> Self {
        Self::with_record(
            RequestLogRecord {
                request_id: Uuid::new_v4(),
                ..RequestLogRecord::default()
            },
            writer,
        )
    }

    fn with_record(record: RequestLogRecord, writer: Arc<dyn RequestLogWriter>) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
            writer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RequestLogRecord> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind the request, its type and its raw payload.
    pub fn init(&self, request: &ReportingRequest, request_type: RequestType, raw_payload: &[u8]) {
        let mut record = self.lock();
        record.request_type = request_type;
        record.cube = Some(request.cube.clone());
        record.request = Some(request.to_string());
        record.raw_payload = Some(String::from_utf8_lossy(raw_payload).into_owned());
        record.started_at = Some(Utc::now());
    }

    pub fn request_id(&self) -> Uuid {
        self.lock().request_id
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().started_at.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().status != LogStatus::Open
    }

    /// Close the record as successful. Returns false if it was already
    /// closed.
    pub fn log_success(&self) -> bool {
        self.close(LogStatus::Success, None)
    }

    /// Close the record as failed. Returns false if it was already closed.
    pub fn log_failed(&self, message: &str) -> bool {
        self.close(LogStatus::Failed, Some(message.to_string()))
    }

    fn close(&self, status: LogStatus, error: Option<String>) -> bool {
        let record = {
            let mut record = self.lock();
            if record.status != LogStatus::Open {
                warn!(
                    request_id = %record.request_id,
                    status = ?record.status,
                    "Request log already closed"
                );
                return false;
            }
            let now = Utc::now();
            record.status = status;
            record.error = error;
            record.finished_at = Some(now);
            record.duration_ms = record
                .started_at
                .map(|started| (now - started).num_milliseconds());
            record.clone()
        };
        self.writer.write(&record);
        true
    }

    /// Start a new record for a secondary execution of the same request.
    pub fn fork(&self, request_type: RequestType) -> Self {
        let parent = self.lock();
        let record = RequestLogRecord {
            request_id: Uuid::new_v4(),
            parent_id: Some(parent.request_id),
            request_type,
            cube: parent.cube.clone(),
            request: parent.request.clone(),
            raw_payload: parent.raw_payload.clone(),
            started_at: Some(Utc::now()),
            ..RequestLogRecord::default()
        };
        Self::with_record(record, self.writer.clone())
    }

    /// Copy of the record as it stands.
    pub fn snapshot(&self) -> RequestLogRecord {
        self.lock().clone()
    }

    pub fn set_curator(&self, curator: &str) {
        self.lock().curator = Some(curator.to_string());
    }

    pub fn set_revision(&self, revision: u32) {
        self.lock().revision = Some(revision);
    }

    pub fn set_engine(&self, engine: Engine) {
        self.lock().engine = Some(engine);
    }

    pub fn set_fact(&self, fact: &str) {
        self.lock().fact = Some(fact.to_string());
    }

    pub fn set_row_count(&self, row_count: usize) {
        self.lock().row_count = Some(row_count);
    }

    pub fn set_total_rows(&self, total_rows: u64) {
        self.lock().total_rows = Some(total_rows);
    }
}
