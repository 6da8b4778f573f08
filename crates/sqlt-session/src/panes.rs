//! Result pane visibility.
//!
//! Which panes are visible is a pure function of the session phase and of
//! whether any result exists. [`PaneController`] adds the presentation
//! timing: a visibility change keeps a transition flag raised for a fixed
//! interval, after which the new state is settled.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::phase::SessionPhase;

/// A result display region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneId {
    /// The learner's result.
    QueryResult,
    /// The reference result.
    Solution,
}

/// Returns the panes visible in `phase`.
///
/// The query pane shows once any result exists; the solution pane shows only
/// while checked or solved.
///
/// # Examples
///
/// ```
/// use sqlt_session::{visible_panes, PaneId, SessionPhase};
///
/// assert!(visible_panes(SessionPhase::New, false).is_empty());
/// assert!(visible_panes(SessionPhase::Solved, true).contains(&PaneId::Solution));
/// assert!(!visible_panes(SessionPhase::Executed, true).contains(&PaneId::Solution));
/// ```
#[must_use]
pub fn visible_panes(phase: SessionPhase, has_result: bool) -> BTreeSet<PaneId> {
    let mut panes = BTreeSet::new();
    if has_result {
        panes.insert(PaneId::QueryResult);
    }
    if phase.shows_solution() {
        panes.insert(PaneId::Solution);
    }
    panes
}

/// How panes are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Side by side; a hidden solution pane stays mounted with zero width.
    Split,
    /// Stacked vertically; a hidden solution pane is not mounted at all.
    Stacked,
}

impl Layout {
    /// Chooses the layout for a viewport width.
    #[must_use]
    pub const fn for_width(width: u32, narrow_width: u32) -> Self {
        if width <= narrow_width {
            Self::Stacked
        } else {
            Self::Split
        }
    }
}

/// Tracks pane visibility and its transition interval.
#[derive(Debug, Clone)]
pub struct PaneController {
    transition: Duration,
    layout: Layout,
    visible: BTreeSet<PaneId>,
    transition_until: Option<Instant>,
}

impl PaneController {
    /// Creates a controller with nothing visible.
    #[must_use]
    pub const fn new(transition: Duration, layout: Layout) -> Self {
        Self {
            transition,
            layout,
            visible: BTreeSet::new(),
            transition_until: None,
        }
    }

    /// Re-derives visibility. Returns `true` if the solution pane toggled.
    ///
    /// A toggle raises the transition flag until `now + transition`.
    pub fn update(&mut self, phase: SessionPhase, has_result: bool, now: Instant) -> bool {
        let next = visible_panes(phase, has_result);
        let toggled =
            next.contains(&PaneId::Solution) != self.visible.contains(&PaneId::Solution);
        if toggled {
            self.transition_until = Some(now + self.transition);
        }
        self.visible = next;
        toggled
    }

    /// Returns `true` while a visibility change is still animating.
    #[must_use]
    pub fn is_transitioning(&self, now: Instant) -> bool {
        self.transition_until.is_some_and(|until| now < until)
    }

    /// Panes that are visible once any transition settles.
    #[must_use]
    pub const fn visible(&self) -> &BTreeSet<PaneId> {
        &self.visible
    }

    /// Returns `true` if `pane` is visible.
    #[must_use]
    pub fn is_visible(&self, pane: PaneId) -> bool {
        self.visible.contains(&pane)
    }

    /// Returns `true` if `pane` exists in the layout, visible or not.
    #[must_use]
    pub fn is_mounted(&self, pane: PaneId) -> bool {
        match (self.layout, pane) {
            (_, PaneId::QueryResult) | (Layout::Split, PaneId::Solution) => true,
            (Layout::Stacked, PaneId::Solution) => self.is_visible(PaneId::Solution),
        }
    }

    /// Current layout.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Switches layout, e.g. after a viewport resize.
    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }
}
