//! Request coordinator - buckets a request and runs its curators.
//!
//! ```text
//!                      ┌──► spawn_blocking: curator(primary) ──► CuratorResult
//! BucketParams ──► select
//!                      └──► spawn_blocking: curator(dry run)  ──► own log record
//! ```
//!
//! The primary execution resolves the returned future exactly once. A dry
//! run is detached: its outcome is logged on a forked record and never
//! affects the primary result.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use crate::bucket::{BucketParams, BucketSelector, BucketVariant, BucketingError};
use crate::curator::{Curator, CuratorResult};
use crate::logging::{RequestLogHelper, RequestType};
use crate::model::ReportingRequest;

/// Orchestration failures. Backend failures travel inside the
/// [`CuratorResult`] instead.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Bucketing failed: {0}")]
    Bucketing(#[from] BucketingError),

    #[error("Curator '{curator}' panicked: {message}")]
    CuratorPanicked {
        curator: &'static str,
        message: String,
    },

    #[error("Curator '{0}' was cancelled")]
    CuratorCancelled(&'static str),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Single entry point from the request processor.
#[async_trait]
pub trait RequestCoordinator: Send + Sync {
    async fn execute(
        &self,
        registry_name: &str,
        bucket_params: BucketParams,
        request: Arc<ReportingRequest>,
        log: RequestLogHelper,
    ) -> CoordinatorResult<CuratorResult>;
}

/// Runs the selected variant on the blocking pool, plus a detached dry
/// run when one is selected.
pub struct DefaultRequestCoordinator {
    selector: Arc<dyn BucketSelector>,
    curator: Arc<dyn Curator>,
}

impl DefaultRequestCoordinator {
    pub fn new(selector: Arc<dyn BucketSelector>, curator: Arc<dyn Curator>) -> Self {
        Self { selector, curator }
    }

    fn spawn_dry_run(
        &self,
        registry_name: &str,
        variant: BucketVariant,
        request: Arc<ReportingRequest>,
        log: &RequestLogHelper,
    ) {
        let curator = self.curator.clone();
        let registry_name = registry_name.to_string();
        let log = log.fork(RequestType::DryRun);
        debug!(request_id = %log.request_id(), ?variant, "Starting dry run");

        tokio::task::spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                curator.execute(&registry_name, &variant, request, &log)
            }));
            match outcome {
                Ok(result) => match result.result() {
                    Ok(_) => {
                        log.log_success();
                    }
                    Err(e) => {
                        warn!(request_id = %log.request_id(), error = %e, "Dry run failed");
                        log.log_failed(&e.to_string());
                    }
                },
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(request_id = %log.request_id(), %message, "Dry run panicked");
                    log.log_failed(&format!("Curator panicked: {}", message));
                }
            }
        });
    }
}

#[async_trait]
impl RequestCoordinator for DefaultRequestCoordinator {
    async fn execute(
        &self,
        registry_name: &str,
        bucket_params: BucketParams,
        request: Arc<ReportingRequest>,
        log: RequestLogHelper,
    ) -> CoordinatorResult<CuratorResult> {
        let selection = self.selector.select(registry_name, &request, bucket_params)?;

        if let Some(variant) = selection.dry_run {
            self.spawn_dry_run(registry_name, variant, request.clone(), &log);
        }

        let curator = self.curator.clone();
        let name = curator.name();
        let registry_name = registry_name.to_string();
        let variant = selection.primary;
        tokio::task::spawn_blocking(move || curator.execute(&registry_name, &variant, request, &log))
            .await
            .map_err(|e| join_failure(name, e))
    }
}

fn join_failure(curator: &'static str, e: JoinError) -> CoordinatorError {
    if e.is_panic() {
        let payload = e.into_panic();
        CoordinatorError::CuratorPanicked {
            curator,
            message: panic_message(payload.as_ref()),
        }
    } else {
        CoordinatorError::CuratorCancelled(curator)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
