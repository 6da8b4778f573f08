//! Session events for hosts that observe a session.
//!
//! Events are serialized as JSON objects with `event` and `payload` fields and
//! fanned out over a [`tokio::sync::broadcast`] channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlt_session::{EventBroadcaster, SessionEvent, SessionPhase};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::phase_changed(SessionPhase::New, SessionPhase::Executed));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {event:?}");
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{ErrorCategory, SessionError};
use crate::feedback::Feedback;
use crate::phase::SessionPhase;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `phase_changed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChangedPayload {
    /// Phase before the transition.
    pub from: SessionPhase,
    /// Phase after the transition.
    pub to: SessionPhase,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

/// Which result slot was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSlot {
    /// The learner's result.
    Query,
    /// The reference result.
    Solution,
}

/// Payload for the `result_updated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultUpdatedPayload {
    /// The slot that changed.
    pub slot: ResultSlot,
    /// Row count of the new result.
    pub rows: usize,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Presentation category.
    pub category: ErrorCategory,
    /// Message shown to the learner.
    pub message: String,
}

/// Payload for the `lock_changed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockChangedPayload {
    /// New lock state.
    pub locked: bool,
}

/// Payload for the `celebrate` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CelebratePayload {
    /// Topic that was just completed.
    pub topic: String,
}

// ============================================================================
// SessionEvent
// ============================================================================

/// Observable session events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session phase changed.
    PhaseChanged(PhaseChangedPayload),
    /// A result pane received new data.
    ResultUpdated(ResultUpdatedPayload),
    /// Check feedback is ready to show.
    Feedback(Feedback),
    /// The topic was just completed.
    Celebrate(CelebratePayload),
    /// A surfaced error occurred.
    Error(ErrorPayload),
    /// The toolbar lock changed.
    LockChanged(LockChangedPayload),
}

impl SessionEvent {
    /// Creates a `PhaseChanged` event stamped with the current time.
    #[must_use]
    pub fn phase_changed(from: SessionPhase, to: SessionPhase) -> Self {
        Self::PhaseChanged(PhaseChangedPayload {
            from,
            to,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `ResultUpdated` event.
    #[must_use]
    pub const fn result_updated(slot: ResultSlot, rows: usize) -> Self {
        Self::ResultUpdated(ResultUpdatedPayload { slot, rows })
    }

    /// Creates an `Error` event from a session error.
    #[must_use]
    pub fn error(err: &SessionError) -> Self {
        Self::Error(ErrorPayload {
            category: err.category(),
            message: err.to_string(),
        })
    }

    /// Creates a `LockChanged` event.
    #[must_use]
    pub const fn lock_changed(locked: bool) -> Self {
        Self::LockChanged(LockChangedPayload { locked })
    }

    /// Creates a `Celebrate` event.
    #[must_use]
    pub fn celebrate(topic: impl Into<String>) -> Self {
        Self::Celebrate(CelebratePayload {
            topic: topic.into(),
        })
    }
}

// ============================================================================
// EventBroadcaster
// ============================================================================

/// Fans session events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering `capacity` events per subscriber.
    ///
    /// A capacity of `0` is raised to `1`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives `Lagged` and misses events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event. Returns the number of receivers.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}
