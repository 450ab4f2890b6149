//! Data access for row-oriented stores.
//!
//! Statements take positional [`SqlArg`] arguments and every call returns a
//! [`DataAccessResult`]. Each call opens its own connection, released when
//! the call returns on every path.

mod sqlite;

pub use sqlite::SqliteDataSource;

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::ToSql;

use crate::config::SettingsError;
use crate::model::FilterValue;

/// Errors raised by the data-access layer.
#[derive(Debug, thiserror::Error)]
pub enum DataAccessError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid data source configuration: {0}")]
    Config(#[from] SettingsError),
}

pub type DataAccessResult<T> = Result<T, DataAccessError>;

/// A positional statement argument.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Int(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Float(f32),
    Byte(i8),
    Short(i16),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Text(String),
    Null,
}

impl SqlArg {
    /// Fallback for any other argument type: bind its string form.
    pub fn coerce(value: impl fmt::Display) -> Self {
        SqlArg::Text(value.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlArg::Null)
    }
}

impl ToSql for SqlArg {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlArg::Int(v) => v.to_sql(),
            SqlArg::Long(v) => v.to_sql(),
            SqlArg::Double(v) => v.to_sql(),
            SqlArg::Boolean(v) => v.to_sql(),
            SqlArg::Float(v) => Ok(ToSqlOutput::from(f64::from(*v))),
            SqlArg::Byte(v) => v.to_sql(),
            SqlArg::Short(v) => v.to_sql(),
            SqlArg::Timestamp(v) => v.to_sql(),
            SqlArg::Date(v) => v.to_sql(),
            SqlArg::Text(v) => v.to_sql(),
            SqlArg::Null => Ok(ToSqlOutput::Owned(SqlValue::Null)),
        }
    }
}

impl From<i32> for SqlArg {
    fn from(v: i32) -> Self {
        SqlArg::Int(v)
    }
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::Long(v)
    }
}

impl From<f64> for SqlArg {
    fn from(v: f64) -> Self {
        SqlArg::Double(v)
    }
}

impl From<bool> for SqlArg {
    fn from(v: bool) -> Self {
        SqlArg::Boolean(v)
    }
}

impl From<f32> for SqlArg {
    fn from(v: f32) -> Self {
        SqlArg::Float(v)
    }
}

impl From<i8> for SqlArg {
    fn from(v: i8) -> Self {
        SqlArg::Byte(v)
    }
}

impl From<i16> for SqlArg {
    fn from(v: i16) -> Self {
        SqlArg::Short(v)
    }
}

impl From<NaiveDateTime> for SqlArg {
    fn from(v: NaiveDateTime) -> Self {
        SqlArg::Timestamp(v)
    }
}

impl From<NaiveDate> for SqlArg {
    fn from(v: NaiveDate) -> Self {
        SqlArg::Date(v)
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        SqlArg::Text(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_string())
    }
}

impl<T: Into<SqlArg>> From<Option<T>> for SqlArg {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlArg::Null, Into::into)
    }
}

impl From<&FilterValue> for SqlArg {
    fn from(v: &FilterValue) -> Self {
        match v {
            FilterValue::Bool(v) => SqlArg::Boolean(*v),
            FilterValue::Int(v) => SqlArg::Long(*v),
            FilterValue::Float(v) => SqlArg::Double(*v),
            FilterValue::String(v) => SqlArg::Text(v.clone()),
        }
    }
}
