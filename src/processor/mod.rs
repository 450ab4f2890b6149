//! Request processor - the boundary between callers and the coordinator.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────── process() ───────────────────────────────┐
//! │  no callback? ──► Err(NoObserver)                                      │
//! │  log.init ──► monitor.start ──► runtime.spawn(dispatch) ──► JoinHandle │
//! └────────────────────────────────────────────────────────────────────────┘
//!                                     │
//!                                     ▼
//! ┌──────────────────────────────── dispatch ──────────────────────────────┐
//! │  coordinator.execute ─┬─ Err / panic ──────► on_failure ──► fail       │
//! │                       ├─ curator failure ──► on_failure ──► fail       │
//! │                       └─ success ──► on_success ─┬─ Ok ───► succeed    │
//! │                                                  └─ Err ──► fail       │
//! │  RequestBracket: log close, then monitor stop, exactly once            │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callbacks run on a runtime worker, never on the caller's thread. Errors
//! and panics raised by callbacks are caught and logged.

mod bracket;

pub use bracket::{RequestBracket, ABANDONED};

use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::bucket::BucketParams;
use crate::config::RegistrySettings;
use crate::coordinator::{panic_message, RequestCoordinator};
use crate::logging::{RequestLogHelper, RequestLogWriter, RequestType};
use crate::model::{ReportingRequest, RequestModel, RequestResult};
use crate::monitor::ServiceMonitor;

/// Message of failures raised while coordinating a request.
pub const COORDINATION_FAILURE: &str = "Failed to coordinate request";

/// Message of failures raised by the backend pipeline.
pub const EXECUTION_FAILURE: &str = "Failed to execute the query pipeline";

/// Error a caller callback may return.
pub type CallbackError = Box<dyn Error + Send + Sync>;

pub type CallbackResult = Result<(), CallbackError>;

type SuccessCallback = Box<dyn FnOnce(Arc<RequestModel>, RequestResult) -> CallbackResult + Send>;
type FailureCallback = Box<dyn FnOnce(GeneralError) -> CallbackResult + Send>;

/// Errors returned synchronously by [`RequestProcessor::process`].
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("No success or failure callback registered")]
    NoObserver,
}

/// Failure delivered to the failure callback: a fixed message plus the
/// underlying cause.
#[derive(Debug)]
pub struct GeneralError {
    message: String,
    cause: Option<Box<dyn Error + Send + Sync>>,
}

impl GeneralError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Message followed by the cause, for log records.
    pub fn detail(&self) -> String {
        match &self.cause {
            Some(cause) => format!("{}: {}", self.message, cause),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for GeneralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for GeneralError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Shared collaborators; creates one [`RequestProcessor`] per request.
#[derive(Clone)]
pub struct RequestProcessorFactory {
    coordinator: Arc<dyn RequestCoordinator>,
    monitor: Arc<dyn ServiceMonitor>,
    log_writer: Arc<dyn RequestLogWriter>,
    runtime: Handle,
    default_registry: String,
}

impl RequestProcessorFactory {
    pub fn new(
        coordinator: Arc<dyn RequestCoordinator>,
        monitor: Arc<dyn ServiceMonitor>,
        log_writer: Arc<dyn RequestLogWriter>,
        runtime: Handle,
    ) -> Self {
        Self {
            coordinator,
            monitor,
            log_writer,
            runtime,
            default_registry: RegistrySettings::default().default_name,
        }
    }

    /// Registry used by [`create_default`](Self::create_default), normally
    /// `[registry] default` from the settings.
    pub fn with_default_registry(mut self, name: impl Into<String>) -> Self {
        self.default_registry = name.into();
        self
    }

    pub fn default_registry(&self) -> &str {
        &self.default_registry
    }

    /// Create a processor for a request that names no registry.
    pub fn create_default(&self, request_type: RequestType) -> RequestProcessor {
        self.create(&self.default_registry, request_type)
    }

    pub fn create(&self, registry_name: &str, request_type: RequestType) -> RequestProcessor {
        RequestProcessor {
            registry_name: registry_name.to_string(),
            request_type,
            coordinator: self.coordinator.clone(),
            monitor: self.monitor.clone(),
            log: RequestLogHelper::new(self.log_writer.clone()),
            runtime: self.runtime.clone(),
            on_success: None,
            on_failure: None,
        }
    }
}

/// Processes one request and reports its outcome through callbacks.
pub struct RequestProcessor {
    registry_name: String,
    request_type: RequestType,
    coordinator: Arc<dyn RequestCoordinator>,
    monitor: Arc<dyn ServiceMonitor>,
    log: RequestLogHelper,
    runtime: Handle,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

impl RequestProcessor {
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Arc<RequestModel>, RequestResult) -> CallbackResult + Send + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(GeneralError) -> CallbackResult + Send + 'static,
    {
        self.on_failure = Some(Box::new(callback));
        self
    }

    /// Use an externally supplied log helper, e.g. to chain multi-stage logs.
    pub fn with_log_helper(mut self, log: RequestLogHelper) -> Self {
        self.log = log;
        self
    }

    pub fn log_helper(&self) -> &RequestLogHelper {
        &self.log
    }

    /// Start processing. Returns once the request is scheduled; the outcome
    /// is only observable through the callbacks.
    pub fn process(
        self,
        bucket_params: BucketParams,
        request: ReportingRequest,
        raw_payload: &[u8],
    ) -> Result<JoinHandle<()>, ProcessError> {
        if self.on_success.is_none() && self.on_failure.is_none() {
            return Err(ProcessError::NoObserver);
        }

        let request = Arc::new(request);
        let bracket = RequestBracket::open(
            self.log.clone(),
            self.monitor.clone(),
            request.clone(),
            self.request_type,
            raw_payload,
        );
        debug!(request_id = %bracket.request_id(), request = %request, "Processing request");

        let dispatch = Dispatch {
            on_success: self.on_success,
            on_failure: self.on_failure,
            bracket,
        };
        let coordinator = self.coordinator;
        let registry_name = self.registry_name;
        let log = self.log;

        Ok(self.runtime.spawn(async move {
            let outcome = AssertUnwindSafe(coordinator.execute(&registry_name, bucket_params, request, log))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(result)) => match result.into_parts() {
                    (Some(model), Ok(result)) => dispatch.succeed(model, result),
                    (_, Err(e)) => dispatch.fail(GeneralError::with_cause(EXECUTION_FAILURE, e)),
                    (None, Ok(_)) => dispatch.fail(GeneralError::new(EXECUTION_FAILURE)),
                },
                Ok(Err(e)) => dispatch.fail(GeneralError::with_cause(COORDINATION_FAILURE, e)),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(%message, "Coordinator panicked");
                    dispatch.fail(GeneralError::with_cause(COORDINATION_FAILURE, message))
                }
            }
        }))
    }
}

/// Callback dispatch for one request; owns the bracket.
struct Dispatch {
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
    bracket: RequestBracket,
}

impl Dispatch {
    fn succeed(self, model: Arc<RequestModel>, result: RequestResult) {
        let request_id = self.bracket.request_id();
        let outcome = match self.on_success {
            Some(callback) => invoke("success", || callback(model, result)),
            None => Ok(()),
        };
        match outcome {
            Ok(()) => self.bracket.succeed(),
            Err(message) => {
                error!(%request_id, %message, "Success callback failed");
                self.bracket.fail(&message);
            }
        }
    }

    fn fail(self, failure: GeneralError) {
        let request_id = self.bracket.request_id();
        let detail = failure.detail();
        debug!(%request_id, error = %detail, "Request failed");
        if let Some(callback) = self.on_failure {
            if let Err(message) = invoke("failure", || callback(failure)) {
                error!(%request_id, %message, "Failure callback failed");
            }
        }
        self.bracket.fail(&detail);
    }
}

/// Run a callback, converting returned errors and panics to a message.
fn invoke<F>(kind: &str, callback: F) -> Result<(), String>
where
    F: FnOnce() -> CallbackResult,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{} callback failed: {}", kind, e)),
        Err(payload) => Err(format!(
            "{} callback panicked: {}",
            kind,
            panic_message(payload.as_ref())
        )),
    }
}
