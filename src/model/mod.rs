//! Request and result types.
//!
//! A [`ReportingRequest`] is what the caller asks for. Resolving it against a
//! registry produces a [`RequestModel`]; executing a plan for that model
//! produces a [`RequestResult`].

pub mod request;
pub mod request_model;
pub mod result;

pub use request::{
    Field, Filter, FilterOp, FilterValue, Pagination, ReportingRequest, SortBy, SortOrder,
    DEFAULT_ROWS_PER_PAGE,
};
pub use request_model::{
    DimensionRef, DriveStrategy, ModelOptions, RequestModel, RequestModelError,
    RequestModelResult,
};
pub use result::{RequestResult, Row, RowList, Value};
