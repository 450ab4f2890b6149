//! Reporting requests - the caller-facing query intent.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reporting request: what the caller asks for.
///
/// Requests are immutable descriptions. Derived requests (for example the
/// total-rows request) are built with struct-update copies of the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingRequest {
    /// Cube the request is evaluated against.
    pub cube: String,
    #[serde(rename = "selectFields")]
    pub fields: Vec<Field>,
    #[serde(default, rename = "filterExpressions")]
    pub filters: Vec<Filter>,
    #[serde(default, rename = "sortBy")]
    pub sort: Vec<SortBy>,
    #[serde(flatten)]
    pub pagination: Pagination,
    #[serde(default)]
    pub include_row_count: bool,
    #[serde(default)]
    pub force_dimension_driven: bool,
    #[serde(default)]
    pub force_fact_driven: bool,
}

impl ReportingRequest {
    /// Create a request for a cube with the given field aliases.
    pub fn new<I, S>(cube: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cube: cube.to_string(),
            fields: fields.into_iter().map(Field::new).collect(),
            filters: Vec::new(),
            sort: Vec::new(),
            pagination: Pagination::default(),
            include_row_count: false,
            force_dimension_driven: false,
            force_fact_driven: false,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_sort(mut self, field: &str, order: SortOrder) -> Self {
        self.sort.push(SortBy {
            field: field.to_string(),
            order,
        });
        self
    }

    pub fn with_pagination(mut self, start_index: u64, rows_per_page: u64) -> Self {
        self.pagination = Pagination {
            start_index,
            rows_per_page,
        };
        self
    }

    pub fn with_row_count(mut self) -> Self {
        self.include_row_count = true;
        self
    }

    /// Aliases of the selected fields, in request order.
    pub fn field_aliases(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.alias.as_str())
    }

    /// Parse a request from its JSON payload.
    pub fn from_json(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

impl fmt::Display for ReportingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.field_aliases().collect();
        write!(
            f,
            "{}[{}] start={} rows={}",
            self.cube,
            fields.join(", "),
            self.pagination.start_index,
            self.pagination.rows_per_page
        )?;
        if !self.sort.is_empty() {
            let sort: Vec<String> = self
                .sort
                .iter()
                .map(|s| format!("{} {}", s.field, s.order))
                .collect();
            write!(f, " sort=[{}]", sort.join(", "))?;
        }
        if self.include_row_count {
            f.write_str(" +rowcount")?;
        }
        if self.force_dimension_driven {
            f.write_str(" +dimdriven")?;
        }
        if self.force_fact_driven {
            f.write_str(" +factdriven")?;
        }
        Ok(())
    }
}

/// A selected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Registry alias of the column.
    #[serde(rename = "field")]
    pub alias: String,
    /// Output name, when the caller renames the column.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "alias")]
    pub rename: Option<String>,
}

impl Field {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            rename: None,
        }
    }

    /// Name the column carries in the result.
    pub fn output_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.alias)
    }
}

/// A filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(rename = "operator")]
    pub op: FilterOp,
    #[serde(default)]
    pub values: Vec<FilterValue>,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp, values: Vec<FilterValue>) -> Self {
        Self {
            field: field.to_string(),
            op,
            values,
        }
    }

    pub fn eq(field: &str, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOp::Eq, vec![value.into()])
    }

    pub fn is_in<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        Self::new(field, FilterOp::In, values.into_iter().map(Into::into).collect())
    }

    pub fn between(field: &str, from: impl Into<FilterValue>, to: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOp::Between, vec![from.into(), to.into()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    NotEq,
    In,
    #[serde(rename = "not in")]
    NotIn,
    Between,
    Like,
    #[serde(rename = "isnull")]
    IsNull,
    #[serde(rename = "isnotnull")]
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::String(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::String(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

/// Sort order for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    #[serde(alias = "asc")]
    Asc,
    #[serde(alias = "desc")]
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

/// Pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub start_index: u64,
    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: u64,
}

pub const DEFAULT_ROWS_PER_PAGE: u64 = 200;

fn default_rows_per_page() -> u64 {
    DEFAULT_ROWS_PER_PAGE
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            start_index: 0,
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
        }
    }
}
