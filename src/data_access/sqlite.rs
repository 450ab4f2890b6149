//! SQLite data source.
//!
//! Every call opens its own connection and drops it when the call returns,
//! so one unit of work never shares a connection with another.

use std::sync::Mutex;

use rusqlite::types::{Type, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use super::{DataAccessResult, SqlArg};
use crate::config::ConnectionSettings;
use crate::model::{Row, RowList, Value};

/// A SQLite data source.
///
/// In-memory sources use a shared-cache URI so every connection sees the
/// same database; an anchor connection keeps it alive.
pub struct SqliteDataSource {
    target: String,
    _anchor: Option<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDataSource")
            .field("target", &self.target)
            .finish()
    }
}

impl SqliteDataSource {
    /// Open a file-backed data source.
    pub fn open(path: &str) -> DataAccessResult<Self> {
        // fail early on a bad path
        Connection::open(path)?;
        Ok(Self {
            target: path.to_string(),
            _anchor: None,
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> DataAccessResult<Self> {
        let target = format!("file:curator-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let anchor = Connection::open(&target)?;
        Ok(Self {
            target,
            _anchor: Some(Mutex::new(anchor)),
        })
    }

    /// Open the data source described by a `[connections.<name>]` entry.
    pub fn from_settings(settings: &ConnectionSettings) -> DataAccessResult<Self> {
        settings.check_driver()?;
        let target = settings.resolved_connection_string()?;
        if target == ":memory:" {
            Self::in_memory()
        } else {
            Self::open(&target)
        }
    }

    /// Open a fresh connection for one unit of work.
    pub fn connect(&self) -> DataAccessResult<Connection> {
        debug!(target = %self.target, "Opening connection");
        Ok(Connection::open(&self.target)?)
    }

    /// Run a query and map its first row, if any.
    pub fn query_for_object<T, F>(&self, sql: &str, args: &[SqlArg], mapper: F) -> DataAccessResult<Option<T>>
    where
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.connect()?;
        let value = conn
            .query_row(sql, params_from_iter(args.iter()), mapper)
            .optional()?;
        Ok(value)
    }

    /// Run a query and map every row.
    pub fn query_for_list<T, F>(&self, sql: &str, args: &[SqlArg], mapper: F) -> DataAccessResult<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), mapper)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    /// Run a query and map every row to alias → value, keeping the column
    /// order the statement reports.
    pub fn query_rows(&self, sql: &str, args: &[SqlArg]) -> DataAccessResult<RowList> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| map_row(row, &columns))?
            .collect::<rusqlite::Result<Vec<Row>>>()?;
        Ok(RowList::new(columns, rows))
    }

    /// Run an update and return the affected row count.
    pub fn execute_update(&self, sql: &str, args: &[SqlArg]) -> DataAccessResult<usize> {
        let conn = self.connect()?;
        Ok(conn.execute(sql, params_from_iter(args.iter()))?)
    }

    /// Run any statement. Returns true when it produced a result set, false
    /// when it produced an update count.
    pub fn execute(&self, sql: &str, args: &[SqlArg]) -> DataAccessResult<bool> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() > 0 {
            let mut rows = stmt.query(params_from_iter(args.iter()))?;
            while rows.next()?.is_some() {}
            Ok(true)
        } else {
            stmt.execute(params_from_iter(args.iter()))?;
            Ok(false)
        }
    }

    /// Run a batch of statements without arguments.
    pub fn execute_batch(&self, sql: &str) -> DataAccessResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

/// Map a result row to alias → value.
pub(crate) fn map_row(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (idx, column) in columns.iter().enumerate() {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(_) => {
                return Err(rusqlite::Error::InvalidColumnType(idx, column.clone(), Type::Blob));
            }
        };
        out.insert(column.clone(), value);
    }
    Ok(out)
}
