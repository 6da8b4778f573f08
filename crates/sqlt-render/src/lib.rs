//! Result pane rendering.
//!
//! Turns the panes a session currently shows into text a host can display:
//! Markdown tables for a terminal or chat-style surface, JSON for anything
//! that wants to lay the table out itself.
//!
//! # Types
//!
//! - [`PaneView`] - One titled pane and the result it shows
//!
//! # Generators
//!
//! - [`MarkdownGenerator`] - Pipe tables with mismatch markers
//! - [`json::JsonGenerator`] - Column-ordered JSON views
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sqlt_render::{render_workspace, PaneView};
//! use sqlt_session::{PaneId, ResultSet};
//!
//! let row = json!({"id": 1, "name": "Ada"}).as_object().cloned().unwrap_or_default();
//! let pane = PaneView::new(PaneId::QueryResult, Some(ResultSet::from_rows(vec![row])));
//!
//! let markdown = render_workspace(&[pane]);
//! assert!(markdown.contains("| id | name |"));
//! assert!(markdown.contains("| 1 | Ada |"));
//! ```

pub mod json;
pub mod markdown;

pub use markdown::{render_workspace, MarkdownGenerator};

use sqlt_session::{PaneId, ResultSet, SessionSnapshot};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while rendering panes.
#[derive(Debug, Error)]
pub enum RenderError {
    /// JSON serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for rendering operations.
pub type Result<T> = std::result::Result<T, RenderError>;

// ============================================================================
// Pane View
// ============================================================================

/// Marker placed on mismatched column headers and rows.
pub const MISMATCH_MARKER: &str = "✗";

/// One result pane as it should be displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneView {
    /// Which pane this is.
    pub pane: PaneId,
    /// Heading shown above the table.
    pub title: String,
    /// The result, or `None` while nothing has arrived for this pane.
    pub result: Option<ResultSet>,
}

impl PaneView {
    /// Creates a view with the pane's default title.
    #[must_use]
    pub fn new(pane: PaneId, result: Option<ResultSet>) -> Self {
        Self {
            pane,
            title: default_title(pane).to_string(),
            result,
        }
    }

    /// Replaces the heading.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builds the views for every visible pane of a snapshot.
    ///
    /// The query result comes first, then the solution if it is visible.
    #[must_use]
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Vec<Self> {
        snapshot
            .visible_panes
            .iter()
            .map(|&pane| {
                let result = match pane {
                    PaneId::QueryResult => snapshot.last_result.clone(),
                    PaneId::Solution => snapshot.solution_result.clone(),
                };
                Self::new(pane, result)
            })
            .collect()
    }

    /// Column names, taken from the first row.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.result
            .as_ref()
            .map(ResultSet::columns)
            .unwrap_or_default()
    }
}

const fn default_title(pane: PaneId) -> &'static str {
    match pane {
        PaneId::QueryResult => "Your result",
        PaneId::Solution => "Expected result",
    }
}

// ============================================================================
// Tests
// ============================================================================
