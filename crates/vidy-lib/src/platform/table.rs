//! Tabular query results

use super::{PlatformError, PlatformResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result set returned by a platform query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// All values of a column
    pub fn column(&self, name: &str) -> PlatformResult<Vec<&Value>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| PlatformError::MissingColumn(name.to_string()))?;
        Ok(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }

    /// Value at `row` in the named column
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)
    }

    /// Value at `row` rendered as text; null becomes `None`
    pub fn text(&self, row: usize, name: &str) -> Option<String> {
        self.value(row, name).and_then(value_as_text)
    }

    /// Number of values in a column equal to `label`
    ///
    /// Booleans and numbers are compared by their textual form, so a
    /// classifier emitting `true` matches the label `"true"`.
    pub fn count_label(&self, name: &str, label: &str) -> PlatformResult<u64> {
        let count = self
            .column(name)?
            .into_iter()
            .filter_map(value_as_text)
            .filter(|v| v.eq_ignore_ascii_case(label))
            .count();
        Ok(count as u64)
    }
}

/// Render a scalar JSON value as text
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
