//! Error types for the exercise session controller.
//!
//! This module defines the error hierarchy for every session operation:
//! local query validation, remote exercise-service failures, best-effort
//! buffer persistence, feedback quota, keymap construction and configuration
//! loading.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::commands::KeymapError;

/// A specialized `Result` type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// HTTP status the exercise service uses to signal a feedback quota.
pub const RATE_LIMIT_CODE: u16 = 401;

/// Failure shape returned by the remote exercise service.
///
/// Every failure carries a human-readable message and a numeric code. Transport
/// failures that never produced an HTTP status use code `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ApiError {
    /// Human-readable description from the server or the transport.
    pub message: String,
    /// HTTP status code, or `0` for transport failures.
    pub code: u16,
}

impl ApiError {
    /// Creates a new `ApiError` with the given message and status code.
    #[must_use]
    pub fn new(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    /// Creates an `ApiError` for a failure that never reached the server.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(message, 0)
    }

    /// Returns `true` if the server rejected the request because of a quota.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlt_session::ApiError;
    ///
    /// assert!(ApiError::new("slow down", 401).is_rate_limited());
    /// assert!(!ApiError::new("syntax error", 400).is_rate_limited());
    /// ```
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        self.code == RATE_LIMIT_CODE
    }
}

/// How an error is presented to the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected locally before any network call; shown inline.
    Validation,
    /// The exercise service failed; shown as a transient toast.
    Remote,
    /// A fire-and-forget step failed; logged, never shown.
    BestEffort,
    /// Feedback submission quota exceeded; shown with a dedicated message.
    Quota,
    /// Invalid configuration or keymap; fatal at startup.
    Config,
}

/// Errors that can occur while driving an exercise session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// The editor buffer is too short to be worth sending.
    #[error("No query entered: write at least {min_len} characters before running it")]
    NoQuery {
        /// Minimum number of non-whitespace-trimmed characters required.
        min_len: usize,
    },

    /// Another toolbar command is still waiting for the server.
    #[error("'{command}' ignored: another command is still running")]
    ToolbarLocked {
        /// Name of the rejected command.
        command: String,
    },

    /// Navigation target does not exist in the current topic.
    #[error("Exercise {exercise} does not exist in topic '{topic}'")]
    UnknownExercise {
        /// Topic short name.
        topic: String,
        /// Requested exercise number.
        exercise: u32,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The exercise service returned an error or could not be reached.
    #[error("Database error during {operation}: {}", .source.message)]
    Remote {
        /// The remote operation that failed.
        operation: String,
        /// The failure reported by the service.
        #[source]
        source: ApiError,
    },

    /// The server accepted no more feedback from this user for now.
    ///
    /// Sessions never submit feedback; hosts that do map their failures
    /// through [`SessionError::from_feedback_submission`].
    #[error("You have submitted too much feedback, please try again later")]
    FeedbackQuota {
        /// The underlying rate-limit response.
        #[source]
        source: ApiError,
    },

    // ========================================================================
    // Best-Effort Errors
    // ========================================================================
    /// Persisting the editor buffer failed. Never surfaced to the learner.
    #[error("Buffer save failed: {}", .source.message)]
    BufferSave {
        /// The failure reported by the service.
        #[source]
        source: ApiError,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your sqlt.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The accelerator table failed validation.
    #[error("Invalid keymap: {0}")]
    Keymap(#[from] KeymapError),

    // ========================================================================
    // General Errors
    // ========================================================================
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// Creates a new `NoQuery` validation error.
    #[must_use]
    pub const fn no_query(min_len: usize) -> Self {
        Self::NoQuery { min_len }
    }

    /// Creates a new `ToolbarLocked` error for the named command.
    #[must_use]
    pub fn toolbar_locked(command: impl std::fmt::Display) -> Self {
        Self::ToolbarLocked {
            command: command.to_string(),
        }
    }

    /// Creates a new `UnknownExercise` error.
    #[must_use]
    pub fn unknown_exercise(topic: impl Into<String>, exercise: u32) -> Self {
        Self::UnknownExercise {
            topic: topic.into(),
            exercise,
        }
    }

    /// Creates a new `Remote` error for the named operation.
    #[must_use]
    pub fn remote(operation: impl Into<String>, source: ApiError) -> Self {
        Self::Remote {
            operation: operation.into(),
            source,
        }
    }

    /// Creates a new `BufferSave` error.
    #[must_use]
    pub const fn buffer_save(source: ApiError) -> Self {
        Self::BufferSave { source }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Maps a failed feedback submission to the error shown to the learner.
    ///
    /// For hosts that submit learner feedback alongside a session; nothing in
    /// this crate calls the feedback endpoint.
    ///
    /// A 401 from the feedback endpoint means the user hit the submission
    /// quota and gets a dedicated message; anything else is a plain remote
    /// failure.
    #[must_use]
    pub fn from_feedback_submission(source: ApiError) -> Self {
        if source.is_rate_limited() {
            Self::FeedbackQuota { source }
        } else {
            Self::remote("feedback submission", source)
        }
    }

    /// Returns the presentation category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NoQuery { .. } | Self::ToolbarLocked { .. } | Self::UnknownExercise { .. } => {
                ErrorCategory::Validation
            }
            Self::Remote { .. } | Self::Json(_) => ErrorCategory::Remote,
            Self::FeedbackQuota { .. } => ErrorCategory::Quota,
            Self::BufferSave { .. } => ErrorCategory::BestEffort,
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::Keymap(_) => ErrorCategory::Config,
        }
    }

    /// Returns `true` if the learner may immediately retry.
    ///
    /// Nothing is retried automatically; this only tells a host whether the
    /// session is still usable after the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Config)
    }

    /// Returns `true` if this error should be shown to the learner.
    #[must_use]
    pub const fn is_surfaced(&self) -> bool {
        !matches!(self.category(), ErrorCategory::BestEffort)
    }
}
