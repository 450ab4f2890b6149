//! Request bracket - pairs log init with log close and monitor start with
//! monitor stop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

use crate::coordinator::panic_message;
use crate::logging::{RequestLogHelper, RequestType};
use crate::model::ReportingRequest;
use crate::monitor::ServiceMonitor;

/// Message recorded when a request is torn down before it completed.
pub const ABANDONED: &str = "Request dispatch abandoned";

/// Open lifecycle of one processed request.
///
/// Closed exactly once: by [`succeed`](Self::succeed), by
/// [`fail`](Self::fail), or as failed when dropped while still open.
/// Closing always writes the log record first, then stops the monitor.
pub struct RequestBracket {
    log: RequestLogHelper,
    monitor: Arc<dyn ServiceMonitor>,
    request: Arc<ReportingRequest>,
    request_id: Uuid,
    open: bool,
}

impl RequestBracket {
    /// Initialise the log record, then start the monitor.
    pub fn open(
        log: RequestLogHelper,
        monitor: Arc<dyn ServiceMonitor>,
        request: Arc<ReportingRequest>,
        request_type: RequestType,
        raw_payload: &[u8],
    ) -> Self {
        log.init(&request, request_type, raw_payload);
        let request_id = log.request_id();
        monitor.start(request_id, &request);
        Self {
            log,
            monitor,
            request,
            request_id,
            open: true,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn succeed(mut self) {
        self.close(None);
    }

    pub fn fail(mut self, message: &str) {
        self.close(Some(message));
    }

    fn close(&mut self, failure: Option<&str>) {
        if !self.open {
            return;
        }
        self.open = false;
        // a panicking log writer must not skip the monitor stop
        let logged = panic::catch_unwind(AssertUnwindSafe(|| match failure {
            None => self.log.log_success(),
            Some(message) => self.log.log_failed(message),
        }));
        if let Err(payload) = logged {
            error!(
                request_id = %self.request_id,
                panic = %panic_message(payload.as_ref()),
                "Request log writer panicked"
            );
        }
        self.monitor.stop(self.request_id, &self.request);
    }
}

impl Drop for RequestBracket {
    fn drop(&mut self) {
        if self.open {
            warn!(request_id = %self.request_id, "Closing abandoned request");
            self.close(Some(ABANDONED));
        }
    }
}
