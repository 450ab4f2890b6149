//! # Curator
//!
//! Request coordination and curator execution for a federated reporting
//! service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  RequestProcessor                        │
//! │  (callbacks, log init/close, monitor start/stop)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [tokio task]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 RequestCoordinator                       │
//! │  (bucketing, primary + dry-run curators)                 │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [blocking pool]
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Curator                             │
//! │  RequestModel ──► QueryPlanner ──► ExecutionContext      │
//! │                          │                               │
//! │                          ▼ [paginated + row count]       │
//! │  TotalRowsPlanner ──► RowCountAccumulator                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │         QueryExecutor (RowStoreExecutor / SQLite)        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod bucket;
pub mod config;
pub mod coordinator;
pub mod curator;
pub mod data_access;
pub mod execution;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod planner;
pub mod processor;
pub mod registry;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::bucket::{BucketParams, BucketSelection, BucketSelector, BucketVariant};
    pub use crate::config::{Engine, Settings};
    pub use crate::coordinator::{DefaultRequestCoordinator, RequestCoordinator};
    pub use crate::curator::{Curator, CuratorResult, DefaultCurator, TotalRowsPlanner};
    pub use crate::execution::{ExecutionContext, QueryExecutor};
    pub use crate::logging::{RequestLogHelper, RequestType, TracingLogWriter};
    pub use crate::model::{ReportingRequest, RequestModel, RequestResult, Row, RowList, Value};
    pub use crate::monitor::{InFlightMonitor, ServiceMonitor};
    pub use crate::planner::{DefaultQueryPlanner, QueryPipeline, QueryPlanner};
    pub use crate::processor::{GeneralError, RequestProcessor, RequestProcessorFactory};
    pub use crate::registry::{Registry, RegistryCatalog, RegistryProvider};
}
