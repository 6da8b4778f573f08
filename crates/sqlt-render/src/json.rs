//! JSON rendering of result panes.
//!
//! Each pane becomes `{title, columns, rows, miss_cols, miss_rows}`. Rows are
//! arrays of cell values in column order, so hosts can lay out a table
//! without re-deriving the column set.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sqlt_render::{json::JsonGenerator, PaneView};
//! use sqlt_session::{PaneId, ResultSet};
//!
//! let row = json!({"id": 1}).as_object().cloned().unwrap_or_default();
//! let panes = [PaneView::new(PaneId::QueryResult, Some(ResultSet::from_rows(vec![row])))];
//!
//! let compact = JsonGenerator::new(&panes).generate().unwrap_or_default();
//! assert!(compact.contains(r#""columns":["id"]"#));
//! ```

use serde::Serialize;
use serde_json::Value;
use sqlt_session::PaneId;

use crate::{PaneView, RenderError, Result};

static NULL: Value = Value::Null;

/// Wire shape of one pane.
#[derive(Debug, Serialize)]
struct PaneJson<'a> {
    pane: PaneId,
    title: &'a str,
    columns: Vec<&'a str>,
    rows: Vec<Vec<&'a Value>>,
    miss_cols: Vec<&'a str>,
    miss_rows: Vec<usize>,
    pending: bool,
}

impl<'a> PaneJson<'a> {
    fn from_view(view: &'a PaneView) -> Self {
        let Some(result) = view.result.as_ref() else {
            return Self {
                pane: view.pane,
                title: &view.title,
                columns: Vec::new(),
                rows: Vec::new(),
                miss_cols: Vec::new(),
                miss_rows: Vec::new(),
                pending: true,
            };
        };

        let columns = result.columns();
        let rows = result
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|&column| row.get(column).unwrap_or(&NULL))
                    .collect()
            })
            .collect();

        Self {
            pane: view.pane,
            title: &view.title,
            columns,
            rows,
            miss_cols: result.miss_cols.iter().map(String::as_str).collect(),
            miss_rows: result.miss_rows.iter().copied().collect(),
            pending: false,
        }
    }
}

/// JSON pane generator.
pub struct JsonGenerator<'a> {
    panes: &'a [PaneView],
}

impl<'a> JsonGenerator<'a> {
    /// Creates a generator over `panes`.
    #[must_use]
    pub const fn new(panes: &'a [PaneView]) -> Self {
        Self { panes }
    }

    fn views(&self) -> Vec<PaneJson<'a>> {
        self.panes.iter().map(PaneJson::from_view).collect()
    }

    /// Generates compact JSON, one array of pane objects on a single line.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Serialization`] if serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(&self.views()).map_err(RenderError::from)
    }

    /// Generates pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Serialization`] if serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.views()).map_err(RenderError::from)
    }

    /// Generates a [`Value`] for embedding in a larger document.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Serialization`] if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self.views()).map_err(RenderError::from)
    }
}

// ============================================================================
// Tests
// ============================================================================
