//! Tabular query output with diff markers against a reference result.
//!
//! A [`ResultSet`] is what every execute, check, solution and reset call hands
//! back. Rows keep the column order the server sent. Mismatch markers are only
//! populated by answer checks and flag the rows and columns that differ from
//! the reference solution.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single result row, keyed by column name in server order.
pub type Row = Map<String, Value>;

/// Ordered rows returned by a query, plus optional mismatch markers.
///
/// All rows are expected to share one column set. The columns used for
/// rendering are taken from row 0; an empty result has no columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    /// The rows, in the order the server returned them.
    #[serde(rename = "result")]
    pub rows: Vec<Row>,

    /// Column names that differ from the reference result.
    #[serde(default)]
    pub miss_cols: BTreeSet<String>,

    /// Row indices that differ from the reference result.
    #[serde(default)]
    pub miss_rows: BTreeSet<usize>,
}

impl ResultSet {
    /// Creates a result set from rows, without mismatch markers.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use sqlt_session::ResultSet;
    ///
    /// let rs = ResultSet::from_rows(vec![
    ///     json!({"id": 1, "name": "Ada"}).as_object().cloned().unwrap_or_default(),
    /// ]);
    /// assert_eq!(rs.columns(), vec!["id", "name"]);
    /// assert_eq!(rs.len(), 1);
    /// ```
    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            miss_cols: BTreeSet::new(),
            miss_rows: BTreeSet::new(),
        }
    }

    /// Creates a one-row, one-column result set.
    ///
    /// Used for confirmation payloads such as a database reset.
    #[must_use]
    pub fn single(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut row = Row::new();
        row.insert(column.into(), value.into());
        Self::from_rows(vec![row])
    }

    /// Adds mismatch markers to this result set.
    #[must_use]
    pub fn with_mismatches(
        mut self,
        columns: impl IntoIterator<Item = impl Into<String>>,
        rows: impl IntoIterator<Item = usize>,
    ) -> Self {
        self.miss_cols.extend(columns.into_iter().map(Into::into));
        self.miss_rows.extend(rows);
        self
    }

    /// Returns the column names used for rendering.
    ///
    /// Columns come from the first row. A result with zero rows has no
    /// columns at all; callers render it as an empty table.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns `true` if every row has exactly the column set of row 0.
    #[must_use]
    pub fn has_uniform_columns(&self) -> bool {
        let columns = self.columns();
        self.rows.iter().all(|row| {
            row.len() == columns.len() && columns.iter().all(|col| row.contains_key(*col))
        })
    }

    /// Returns `true` if the column is flagged as differing from the reference.
    #[must_use]
    pub fn is_column_mismatched(&self, column: &str) -> bool {
        self.miss_cols.contains(column)
    }

    /// Returns `true` if the row is flagged as differing from the reference.
    #[must_use]
    pub fn is_row_mismatched(&self, index: usize) -> bool {
        self.miss_rows.contains(&index)
    }

    /// Returns `true` if any mismatch marker is set.
    #[must_use]
    pub fn has_mismatches(&self) -> bool {
        !self.miss_cols.is_empty() || !self.miss_rows.is_empty()
    }

    /// Returns the cell at `row`/`column`, if present.
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Returns the display text for a cell, or an empty string if absent.
    #[must_use]
    pub fn cell_text(&self, row: usize, column: &str) -> String {
        self.cell(row, column).map(display_value).unwrap_or_default()
    }
}

/// Formats a JSON cell value the way a result table shows it.
///
/// Strings are shown without quotes, `null` as `null`, everything else in its
/// JSON form.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
