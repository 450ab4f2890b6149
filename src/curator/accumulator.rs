//! Result accumulators - fold backend rows into one aggregate.

use crate::model::{Row, RowList, Value};

/// Errors raised while accumulating rows.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccumulatorError {
    #[error("Row {row} has no '{alias}' value; the backend does not support row counting")]
    MissingRowCountAlias { row: usize, alias: String },

    #[error("Row {row} has invalid row count {value}")]
    InvalidRowCount { row: usize, value: String },

    #[error("Row count overflowed after {rows} rows")]
    Overflow { rows: usize },
}

pub type AccumulatorResult<T> = Result<T, AccumulatorError>;

/// Folds rows into one output.
pub trait ResultAccumulator {
    type Output;

    fn accumulate(&mut self, row: &Row) -> AccumulatorResult<()>;

    fn finish(self) -> Self::Output;
}

/// Feed every row to an accumulator, stopping at the first failure.
pub fn accumulate_rows<A: ResultAccumulator>(mut accumulator: A, rows: &RowList) -> AccumulatorResult<A::Output> {
    for row in rows {
        accumulator.accumulate(row)?;
    }
    Ok(accumulator.finish())
}

/// Sums the per-row partial counts reported under a row-count alias.
///
/// Values are summed verbatim; rows are not deduplicated.
#[derive(Debug, Clone)]
pub struct RowCountAccumulator {
    alias: String,
    total: u64,
    rows_seen: usize,
}

impl RowCountAccumulator {
    pub fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            total: 0,
            rows_seen: 0,
        }
    }

    fn count_of(&self, value: &Value) -> Option<u64> {
        match value {
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Float(v) if v.fract() == 0.0 && *v >= 0.0 && *v <= u64::MAX as f64 => {
                Some(*v as u64)
            }
            Value::Text(v) => v.trim().parse::<u64>().ok(),
            _ => None,
        }
    }
}

impl ResultAccumulator for RowCountAccumulator {
    type Output = u64;

    fn accumulate(&mut self, row: &Row) -> AccumulatorResult<()> {
        let index = self.rows_seen;
        let value = row
            .get(&self.alias)
            .ok_or_else(|| AccumulatorError::MissingRowCountAlias {
                row: index,
                alias: self.alias.clone(),
            })?;
        let count = self
            .count_of(value)
            .ok_or_else(|| AccumulatorError::InvalidRowCount {
                row: index,
                value: value.to_string(),
            })?;
        self.total = self
            .total
            .checked_add(count)
            .ok_or(AccumulatorError::Overflow { rows: index + 1 })?;
        self.rows_seen += 1;
        Ok(())
    }

    fn finish(self) -> u64 {
        self.total
    }
}
