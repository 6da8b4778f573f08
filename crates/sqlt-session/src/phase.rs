//! Session phase for the exercise session state machine.
//!
//! The phase records which command last completed successfully. It owns no
//! storage of its own: it is derived from the last successful command and is
//! reset to `New` whenever a session is constructed for a route.

use serde::{Deserialize, Serialize};

// ============================================================================
// SessionPhase
// ============================================================================

/// Position of a session in the execute / check / solve / reset lifecycle.
///
/// Transitions:
/// - `New` -> `Executed` | `Reset` (and `Checked` / `Solved`, see below)
/// - `Executed` | `Checked` | `Solved` | `Reset` -> `Executed` | `Checked` | `Solved` | `Reset`
/// - any phase -> `New` on navigation
///
/// No phase is terminal. A check or solution request from `New` is accepted
/// and lands directly in `Checked` / `Solved`, matching what the workspace
/// lets a learner do on a freshly opened exercise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Freshly opened exercise; nothing has run yet.
    #[default]
    New,
    /// The learner's query ran.
    Executed,
    /// The learner's query was graded against the reference solution.
    Checked,
    /// The reference solution was inserted and run.
    Solved,
    /// The sandbox database was reset.
    Reset,
}

impl SessionPhase {
    /// Returns `true` if the reference (solution) result is part of this phase.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlt_session::SessionPhase;
    ///
    /// assert!(SessionPhase::Checked.shows_solution());
    /// assert!(SessionPhase::Solved.shows_solution());
    /// assert!(!SessionPhase::Executed.shows_solution());
    /// ```
    #[must_use]
    pub const fn shows_solution(&self) -> bool {
        matches!(self, Self::Checked | Self::Solved)
    }

    /// Returns `true` if `self -> to` is a legal transition.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlt_session::SessionPhase;
    ///
    /// assert!(SessionPhase::New.can_transition_to(SessionPhase::Executed));
    /// assert!(SessionPhase::Solved.can_transition_to(SessionPhase::New));
    /// assert!(!SessionPhase::New.can_transition_to(SessionPhase::New));
    /// ```
    #[must_use]
    pub const fn can_transition_to(&self, to: Self) -> bool {
        match to {
            // Navigation recreates the session; re-entering `New` from `New`
            // is not a transition.
            Self::New => !matches!(self, Self::New),
            Self::Executed | Self::Checked | Self::Solved | Self::Reset => true,
        }
    }

    /// Returns the snake_case name used in events and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Executed => "executed",
            Self::Checked => "checked",
            Self::Solved => "solved",
            Self::Reset => "reset",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [SessionPhase; 5] = [
        SessionPhase::New,
        SessionPhase::Executed,
        SessionPhase::Checked,
        SessionPhase::Solved,
        SessionPhase::Reset,
    ];

    #[test]
    fn test_phase_default() {
        assert_eq!(SessionPhase::default(), SessionPhase::New);
    }

    #[test]
    fn test_shows_solution() {
        assert!(SessionPhase::Checked.shows_solution());
        assert!(SessionPhase::Solved.shows_solution());

        assert!(!SessionPhase::New.shows_solution());
        assert!(!SessionPhase::Executed.shows_solution());
        assert!(!SessionPhase::Reset.shows_solution());
    }

    #[test]
    fn test_no_phase_is_terminal() {
        for from in ALL {
            assert!(from.can_transition_to(SessionPhase::Executed));
            assert!(from.can_transition_to(SessionPhase::Reset));
        }
    }

    #[test]
    fn test_every_non_new_phase_returns_to_new() {
        for from in ALL.into_iter().filter(|p| *p != SessionPhase::New) {
            assert!(from.can_transition_to(SessionPhase::New), "{from} -> new");
        }
        assert!(!SessionPhase::New.can_transition_to(SessionPhase::New));
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::New).unwrap(),
            r#""new""#
        );
        assert_eq!(
            serde_json::to_string(&SessionPhase::Executed).unwrap(),
            r#""executed""#
        );
        assert_eq!(
            serde_json::to_string(&SessionPhase::Solved).unwrap(),
            r#""solved""#
        );

        let phase: SessionPhase = serde_json::from_str(r#""checked""#).unwrap();
        assert_eq!(phase, SessionPhase::Checked);
    }

    #[test]
    fn test_display_matches_serialization() {
        for phase in ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{phase}\""));
        }
    }
}
