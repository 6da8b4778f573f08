//! SQL training exercise session controller.
//!
//! Sequences execute, check, show-solution and reset calls against a remote
//! exercise service, keeps the result panes in step with the last completed
//! call, and mediates the toolbar lock, keyboard accelerators, favorite
//! toggling and transient feedback.

pub mod buffer;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod feedback;
pub mod panes;
pub mod phase;
pub mod progress;
pub mod result_set;
pub mod session;
pub mod workspace;

pub use client::{
    CheckOutcome, ConfirmationRow, ExerciseClient, HttpExerciseClient, Solution, UserExercisePatch,
};
pub use commands::{
    Command, KeyChord, KeyListener, KeyboardHub, Keymap, KeymapError, Platform, Toolbar,
};
pub use config::{Config, PlatformSetting};
pub use error::{ApiError, ErrorCategory, Result, SessionError, RATE_LIMIT_CODE};
pub use events::{EventBroadcaster, ResultSlot, SessionEvent};
pub use feedback::{Feedback, FeedbackPicker, Polarity};
pub use panes::{visible_panes, Layout, PaneController, PaneId};
pub use phase::SessionPhase;
pub use progress::{ExerciseInfo, ExerciseState, TopicProgress, UserExercise};
pub use result_set::{display_value, ResultSet, Row};
pub use session::{
    mentions_natural_join, ExerciseRoute, Session, SessionSeed, SessionSettings, SessionSnapshot,
};
pub use workspace::Workspace;
