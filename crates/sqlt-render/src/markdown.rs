//! Markdown rendering of result panes.
//!
//! Each pane becomes a level-three heading followed by a pipe table. Column
//! order follows the first row. Columns and rows flagged as mismatched
//! against the reference result carry a leading `✗`.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sqlt_render::{MarkdownGenerator, PaneView};
//! use sqlt_session::{PaneId, ResultSet};
//!
//! let row = json!({"id": 7}).as_object().cloned().unwrap_or_default();
//! let result = ResultSet::from_rows(vec![row]).with_mismatches(["id"], [0]);
//! let panes = [PaneView::new(PaneId::QueryResult, Some(result))];
//!
//! let markdown = MarkdownGenerator::new(&panes).generate();
//! assert!(markdown.contains("| ✗ id |"));
//! assert!(markdown.contains("| ✗ 7 |"));
//! ```

use std::fmt::Write;

use sqlt_session::ResultSet;

use crate::{PaneView, MISMATCH_MARKER};

/// Line shown for a result with no rows.
const NO_ROWS: &str = "_(no rows)_";

/// Line shown for a pane whose result has not arrived.
const PENDING: &str = "_(waiting for result)_";

/// Generates Markdown for a list of panes.
pub struct MarkdownGenerator<'a> {
    panes: &'a [PaneView],
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a generator over `panes`, rendered in the given order.
    #[must_use]
    pub const fn new(panes: &'a [PaneView]) -> Self {
        Self { panes }
    }

    /// Renders every pane, separated by blank lines.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();
        for pane in self.panes {
            Self::write_pane(&mut output, pane);
        }
        output
    }

    fn write_pane(output: &mut String, pane: &PaneView) {
        let _ = writeln!(output, "### {}\n", pane.title);
        match &pane.result {
            None => {
                let _ = writeln!(output, "{PENDING}");
            }
            Some(result) => Self::write_table(output, result),
        }
        let _ = writeln!(output);
    }

    fn write_table(output: &mut String, result: &ResultSet) {
        let columns = result.columns();
        if result.is_empty() || columns.is_empty() {
            let _ = writeln!(output, "{NO_ROWS}");
            return;
        }

        let header: Vec<String> = columns
            .iter()
            .map(|&column| {
                mark(
                    &escape_cell(column),
                    result.is_column_mismatched(column),
                )
            })
            .collect();
        let _ = writeln!(output, "| {} |", header.join(" | "));
        let _ = writeln!(output, "|{}", "---|".repeat(columns.len()));

        for index in 0..result.len() {
            let mut cells: Vec<String> = columns
                .iter()
                .map(|&column| escape_cell(&result.cell_text(index, column)))
                .collect();
            if let Some(first) = cells.first_mut() {
                *first = mark(first, result.is_row_mismatched(index));
            }
            let _ = writeln!(output, "| {} |", cells.join(" | "));
        }
    }
}

/// Renders the panes of a workspace as one Markdown document.
///
/// Panes appear in the order given, which for
/// [`PaneView::from_snapshot`] is the query result first.
#[must_use]
pub fn render_workspace(panes: &[PaneView]) -> String {
    MarkdownGenerator::new(panes).generate()
}

fn mark(text: &str, mismatched: bool) -> String {
    if mismatched {
        format!("{MISMATCH_MARKER} {text}")
    } else {
        text.to_string()
    }
}

/// Escapes characters that would break a table cell.
fn escape_cell(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '|' | '\\' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            '\r' => {}
            _ => result.push(ch),
        }
    }
    result
}

// ============================================================================
// Tests
// ============================================================================
