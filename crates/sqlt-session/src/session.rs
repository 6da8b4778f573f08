//! The exercise session state machine.
//!
//! A [`Session`] owns everything the learner sees for one exercise: the
//! editor buffer, the phase, both result panes, the toolbar lock, the
//! favorite flag and pending feedback. Toolbar operations check the lock and
//! (for commands that send the buffer) its length, raise the lock, await the
//! remote call, then apply the outcome and release the lock.
//!
//! State lives behind an `Arc<Mutex<_>>` and is never held across a remote
//! call, so hosts can observe the lock while a call is in flight. A disposed
//! session lets in-flight calls settle against its own state but publishes
//! nothing further.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer;
use crate::client::{ExerciseClient, UserExercisePatch};
use crate::commands::{Command, KeyChord, KeyListener, KeyboardHub, Keymap, Platform, Toolbar};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::events::{EventBroadcaster, ResultSlot, SessionEvent};
use crate::feedback::{Feedback, FeedbackPicker};
use crate::panes::{Layout, PaneController, PaneId};
use crate::phase::SessionPhase;
use crate::progress::{ExerciseState, TopicProgress};
use crate::result_set::ResultSet;

static NATURAL_JOIN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new("(?i)natural join").ok());

/// Returns `true` if `query` contains `natural join` in any letter case.
#[must_use]
pub fn mentions_natural_join(query: &str) -> bool {
    NATURAL_JOIN.as_ref().map_or_else(
        || query.to_lowercase().contains("natural join"),
        |re| re.is_match(query),
    )
}

// ============================================================================
// Route & settings
// ============================================================================

/// Identifies one exercise: topic short name plus exercise number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExerciseRoute {
    /// Topic short name.
    pub topic: String,
    /// Exercise number within the topic.
    pub exercise: u32,
}

impl ExerciseRoute {
    /// Creates a route.
    #[must_use]
    pub fn new(topic: impl Into<String>, exercise: u32) -> Self {
        Self {
            topic: topic.into(),
            exercise,
        }
    }

    /// The route of another exercise in the same topic.
    #[must_use]
    pub fn sibling(&self, exercise: u32) -> Self {
        Self::new(self.topic.clone(), exercise)
    }
}

impl fmt::Display for ExerciseRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.exercise)
    }
}

/// Tunables a session is built with.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Minimum trimmed query length for toolbar operations.
    pub min_query_length: usize,
    /// Picks check feedback.
    pub feedback: FeedbackPicker,
    /// Pane visibility transition interval.
    pub pane_transition: Duration,
    /// Pane arrangement.
    pub layout: Layout,
    /// Chord interpretation.
    pub toolbar: Toolbar,
}

impl SessionSettings {
    /// Default settings for a platform.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Keymap` if the standard keymap fails validation.
    pub fn new(platform: Platform) -> Result<Self> {
        Self::from_config(&Config::default(), platform, u32::MAX)
    }

    /// Settings derived from configuration and the viewport width.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Keymap` if the standard keymap fails validation.
    pub fn from_config(config: &Config, platform: Platform, viewport_width: u32) -> Result<Self> {
        Ok(Self {
            min_query_length: config.min_query_length,
            feedback: FeedbackPicker::new(config.easter_egg_one_in),
            pane_transition: config.pane_transition(),
            layout: Layout::for_width(viewport_width, config.narrow_viewport_width),
            toolbar: Toolbar::new(platform, Keymap::standard()?),
        })
    }
}

/// Server-side state a session starts from.
#[derive(Debug, Clone, Default)]
pub struct SessionSeed {
    /// Previously persisted editor buffer.
    pub query: String,
    /// Favorite flag.
    pub favorite: bool,
    /// Topic exercise list and grading states.
    pub progress: TopicProgress,
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug)]
struct SessionState {
    query: String,
    phase: SessionPhase,
    last_result: Option<ResultSet>,
    solution_result: Option<ResultSet>,
    toolbar_locked: bool,
    favorite: bool,
    feedback: Option<Feedback>,
    last_correct: Option<bool>,
    natural_join: bool,
    data_model_visible: bool,
    celebrated: bool,
    panes: PaneController,
    progress: TopicProgress,
    pending_save: Option<JoinHandle<()>>,
}

/// A point-in-time copy of a session's observable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Which exercise this is.
    pub route: ExerciseRoute,
    /// Editor contents.
    pub query: String,
    /// Current phase.
    pub phase: SessionPhase,
    /// Result of the last execute, check or reset.
    pub last_result: Option<ResultSet>,
    /// Reference result from the last check or solution request.
    pub solution_result: Option<ResultSet>,
    /// `true` while a toolbar operation awaits the server.
    pub toolbar_locked: bool,
    /// `true` if the buffer is long enough to run.
    pub query_runnable: bool,
    /// Favorite flag.
    pub favorite: bool,
    /// Feedback not yet displayed.
    pub feedback: Option<Feedback>,
    /// Outcome of the last check, if any.
    pub last_correct: Option<bool>,
    /// Set once a natural join has been submitted for checking.
    pub natural_join: bool,
    /// Whether the schema diagram is shown.
    pub data_model_visible: bool,
    /// Panes visible once transitions settle.
    pub visible_panes: BTreeSet<PaneId>,
    /// Whether the solution pane exists in the current layout.
    pub solution_pane_mounted: bool,
}

// ============================================================================
// Session
// ============================================================================

/// Live state and operations for one learner viewing one exercise.
///
/// Cloning is cheap; clones share state. The keyboard listener, if any, is
/// released by [`Session::dispose`] or when the last clone is dropped.
#[derive(Clone)]
pub struct Session {
    route: Arc<ExerciseRoute>,
    client: Arc<dyn ExerciseClient>,
    state: Arc<Mutex<SessionState>>,
    events: EventBroadcaster,
    settings: Arc<SessionSettings>,
    keys: Arc<Mutex<Option<KeyListener>>>,
    disposed: Arc<AtomicBool>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("route", &self.route)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session at [`SessionPhase::New`].
    #[must_use]
    pub fn new(
        route: ExerciseRoute,
        client: Arc<dyn ExerciseClient>,
        settings: SessionSettings,
        seed: SessionSeed,
        events: EventBroadcaster,
    ) -> Self {
        info!(topic = %route.topic, exercise = route.exercise, "Session created");
        let state = SessionState {
            query: seed.query,
            phase: SessionPhase::New,
            last_result: None,
            solution_result: None,
            toolbar_locked: false,
            favorite: seed.favorite,
            feedback: None,
            last_correct: None,
            natural_join: false,
            data_model_visible: false,
            celebrated: false,
            panes: PaneController::new(settings.pane_transition, settings.layout),
            progress: seed.progress,
            pending_save: None,
        };
        Self {
            route: Arc::new(route),
            client,
            state: Arc::new(Mutex::new(state)),
            events,
            settings: Arc::new(settings),
            keys: Arc::new(Mutex::new(None)),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers this session's keyboard listener on `hub`.
    ///
    /// Replaces any listener registered earlier by this session. Clones made
    /// before this call do not see the listener.
    #[must_use]
    pub fn with_keyboard(mut self, hub: &KeyboardHub) -> Self {
        self.keys = Arc::new(Mutex::new(Some(hub.register())));
        self
    }

    /// Tears the session down for navigation.
    ///
    /// Deregisters the keyboard listener for every clone and stops event
    /// publication. A remote call still in flight settles against this
    /// session's state without reaching subscribers.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        drop(self.keys.lock().await.take());
        debug!(route = %self.route, "Session disposed");
    }

    /// `true` once [`Session::dispose`] has run on any clone.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The exercise this session shows.
    #[must_use]
    pub fn route(&self) -> &ExerciseRoute {
        &self.route
    }

    /// The event broadcaster this session publishes to.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// The toolbar this session interprets chords with.
    #[must_use]
    pub fn toolbar(&self) -> &Toolbar {
        &self.settings.toolbar
    }

    /// Copies the current observable state.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            route: (*self.route).clone(),
            query: state.query.clone(),
            phase: state.phase,
            last_result: state.last_result.clone(),
            solution_result: state.solution_result.clone(),
            toolbar_locked: state.toolbar_locked,
            query_runnable: buffer::is_runnable(&state.query, self.settings.min_query_length),
            favorite: state.favorite,
            feedback: state.feedback.clone(),
            last_correct: state.last_correct,
            natural_join: state.natural_join,
            data_model_visible: state.data_model_visible,
            visible_panes: state.panes.visible().clone(),
            solution_pane_mounted: state.panes.is_mounted(PaneId::Solution),
        }
    }

    /// Current phase.
    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// `true` while a toolbar operation awaits the server.
    pub async fn is_locked(&self) -> bool {
        self.state.lock().await.toolbar_locked
    }

    /// Current editor contents.
    pub async fn query(&self) -> String {
        self.state.lock().await.query.clone()
    }

    /// `true` while the pane visibility change is still animating.
    pub async fn panes_transitioning(&self, now: Instant) -> bool {
        self.state.lock().await.panes.is_transitioning(now)
    }

    /// Badge for an exercise of this topic.
    pub async fn badge(&self, exercise: u32) -> ExerciseState {
        let state = self.state.lock().await;
        state.progress.badge(exercise, state.natural_join)
    }

    /// Copy of the topic progress as this session last recorded it.
    pub async fn progress(&self) -> TopicProgress {
        self.state.lock().await.progress.clone()
    }

    /// Returns and clears pending feedback.
    pub async fn take_feedback(&self) -> Option<Feedback> {
        self.state.lock().await.feedback.take()
    }

    // ------------------------------------------------------------------------
    // Editor
    // ------------------------------------------------------------------------

    /// Replaces the editor contents.
    pub async fn set_query(&self, text: impl Into<String>) {
        self.state.lock().await.query = text.into();
    }

    /// Appends a line to the editor contents.
    pub async fn append_line(&self, line: &str) {
        let mut state = self.state.lock().await;
        if !state.query.is_empty() {
            state.query.push('\n');
        }
        state.query.push_str(line);
    }

    /// Empties the editor. Disabled while the toolbar is locked.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !Toolbar::is_enabled(Command::Clear, state.toolbar_locked) {
            drop(state);
            return Err(self.fail(SessionError::toolbar_locked(Command::Clear)));
        }
        state.query.clear();
        debug!(route = %self.route, "Editor cleared");
        Ok(())
    }

    /// Toggles the schema diagram. Never locked.
    pub async fn toggle_data_model(&self) -> bool {
        let mut state = self.state.lock().await;
        state.data_model_visible = !state.data_model_visible;
        state.data_model_visible
    }

    // ------------------------------------------------------------------------
    // Toolbar operations
    // ------------------------------------------------------------------------

    /// Runs the learner's query.
    pub async fn execute(&self) -> Result<()> {
        let query = self.begin(Command::Execute).await?;
        debug!(route = %self.route, "Executing query");
        let outcome = self
            .client
            .execute_query(&self.route.topic, self.route.exercise, &query)
            .await;

        let mut state = self.state.lock().await;
        state.toolbar_locked = false;
        match outcome {
            Ok(result) => {
                let rows = result.len();
                state.last_result = Some(result);
                let from = self.transition(&mut state, SessionPhase::Executed);
                drop(state);
                self.finish(from, SessionPhase::Executed, &[(ResultSlot::Query, rows)]);
                Ok(())
            }
            Err(err) => {
                drop(state);
                self.publish(SessionEvent::lock_changed(false));
                Err(self.fail(SessionError::remote("execute", err)))
            }
        }
    }

    /// Grades the learner's query and records the outcome.
    pub async fn check(&self) -> Result<()> {
        let query = self.begin(Command::Check).await?;
        if mentions_natural_join(&query) {
            self.state.lock().await.natural_join = true;
            info!(route = %self.route, "Natural join submitted, badges forced to wrong");
        }

        debug!(route = %self.route, "Checking answer");
        let outcome = self
            .client
            .check_answer(&self.route.topic, self.route.exercise, &query)
            .await;

        let mut state = self.state.lock().await;
        state.toolbar_locked = false;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                drop(state);
                self.publish(SessionEvent::lock_changed(false));
                return Err(self.fail(SessionError::remote("check", err)));
            }
        };

        let exercise = self.route.exercise;
        state.progress.record(exercise, outcome.correct);
        let celebrate =
            !state.celebrated && state.progress.completes_topic(exercise, outcome.correct);
        if celebrate {
            state.celebrated = true;
        }

        let feedback = self
            .settings
            .feedback
            .pick(outcome.correct, outcome.message.clone());
        state.feedback = Some(feedback.clone());
        state.last_correct = Some(outcome.correct);

        let slots = [
            (ResultSlot::Query, outcome.student_result.len()),
            (ResultSlot::Solution, outcome.solution_result.len()),
        ];
        state.last_result = Some(outcome.student_result);
        state.solution_result = Some(outcome.solution_result);
        let from = self.transition(&mut state, SessionPhase::Checked);
        drop(state);

        info!(route = %self.route, correct = outcome.correct, "Answer checked");
        self.finish(from, SessionPhase::Checked, &slots);
        self.publish(SessionEvent::Feedback(feedback));
        if celebrate {
            info!(topic = %self.route.topic, "Topic complete");
            self.publish(SessionEvent::celebrate(self.route.topic.clone()));
        }
        Ok(())
    }

    /// Inserts the reference solution beneath the commented-out buffer and
    /// runs both.
    pub async fn show_solution(&self) -> Result<()> {
        let query = self.begin(Command::ShowSolution).await?;
        let (topic, exercise) = (self.route.topic.as_str(), self.route.exercise);

        debug!(route = %self.route, "Fetching solutions");
        let solutions = match self.client.list_solution(topic, exercise).await {
            Ok(solutions) => solutions,
            Err(err) => return Err(self.abort(SessionError::remote("list solution", err)).await),
        };

        let combined = buffer::with_solutions(&query, &solutions);
        self.state.lock().await.query.clone_from(&combined);

        let (student, reference) = futures::future::join(
            self.client.execute_query(topic, exercise, &combined),
            self.client.solution_result(topic, exercise),
        )
        .await;
        let student = match student {
            Ok(result) => result,
            Err(err) => return Err(self.abort(SessionError::remote("execute", err)).await),
        };
        let reference = match reference {
            Ok(result) => result,
            Err(err) => {
                return Err(self
                    .abort(SessionError::remote("solution result", err))
                    .await)
            }
        };

        let slots = [
            (ResultSlot::Query, student.len()),
            (ResultSlot::Solution, reference.len()),
        ];
        let mut state = self.state.lock().await;
        state.toolbar_locked = false;
        state.last_result = Some(student);
        state.solution_result = Some(reference);
        let from = self.transition(&mut state, SessionPhase::Solved);
        drop(state);
        self.finish(from, SessionPhase::Solved, &slots);
        Ok(())
    }

    /// Persists the buffer without waiting, then resets the sandbox.
    ///
    /// Any buffer may reset; one too short to run is simply not saved.
    pub async fn reset_database(&self) -> Result<()> {
        let query = self.begin(Command::Reset).await?;
        self.persist_buffer(query).await;

        debug!(route = %self.route, "Resetting database");
        let outcome = self
            .client
            .reset_db(&self.route.topic, self.route.exercise)
            .await;

        let mut state = self.state.lock().await;
        state.toolbar_locked = false;
        match outcome {
            Ok(confirmation) => {
                state.last_result = Some(confirmation.into_result_set());
                let from = self.transition(&mut state, SessionPhase::Reset);
                drop(state);
                self.finish(from, SessionPhase::Reset, &[(ResultSlot::Query, 1)]);
                Ok(())
            }
            Err(err) => {
                drop(state);
                self.publish(SessionEvent::lock_changed(false));
                Err(self.fail(SessionError::remote("reset", err)))
            }
        }
    }

    /// Flips the favorite flag, rolling back if the server refuses.
    pub async fn toggle_favorite(&self) -> Result<bool> {
        let wanted = {
            let mut state = self.state.lock().await;
            state.favorite = !state.favorite;
            state.favorite
        };

        match self
            .client
            .patch_user_exercise(
                &self.route.topic,
                self.route.exercise,
                UserExercisePatch::favorite(wanted),
            )
            .await
        {
            Ok(()) => {
                debug!(route = %self.route, favorite = wanted, "Favorite updated");
                Ok(wanted)
            }
            Err(err) => {
                self.state.lock().await.favorite = !wanted;
                Err(self.fail(SessionError::remote("favorite", err)))
            }
        }
    }

    /// Persists the buffer in the background. Failures are only logged.
    ///
    /// Buffers too short to run are not saved.
    pub async fn persist_buffer(&self, text: String) {
        if !buffer::is_runnable(&text, self.settings.min_query_length) {
            return;
        }
        let client = Arc::clone(&self.client);
        let route = Arc::clone(&self.route);
        let handle = tokio::spawn(async move {
            if let Err(source) = client
                .patch_user_exercise(&route.topic, route.exercise, UserExercisePatch::buffer(text))
                .await
            {
                let err = SessionError::buffer_save(source);
                warn!(route = %route, error = %err, "Best-effort buffer save failed");
            }
        });
        self.state.lock().await.pending_save = Some(handle);
    }

    /// Waits for the last background buffer save, if any.
    pub async fn flush_persistence(&self) {
        let handle = self.state.lock().await.pending_save.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(route = %self.route, error = %err, "Buffer save task failed");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Runs a toolbar command.
    pub async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::ShowDataModel => {
                self.toggle_data_model().await;
                Ok(())
            }
            Command::Execute => self.execute().await,
            Command::Check => self.check().await,
            Command::ShowSolution => self.show_solution().await,
            Command::Reset => self.reset_database().await,
            Command::Clear => self.clear().await,
        }
    }

    /// Resolves a chord against the toolbar and the current lock.
    pub async fn resolve_key(&self, chord: KeyChord) -> Option<Command> {
        let locked = self.is_locked().await;
        self.settings.toolbar.handle_key(chord, locked)
    }

    /// Resolves and runs a chord. Returns `None` if the chord was ignored.
    pub async fn handle_key(&self, chord: KeyChord) -> Option<(Command, Result<()>)> {
        let command = self.resolve_key(chord).await?;
        debug!(route = %self.route, %chord, %command, "Accelerator");
        Some((command, self.dispatch(command).await))
    }

    /// Runs every chord queued on this session's keyboard listener.
    pub async fn pump_keys(&self) -> Vec<(Command, Result<()>)> {
        let mut outcomes = Vec::new();
        loop {
            let chord = self.keys.lock().await.as_mut().and_then(KeyListener::try_next);
            let Some(chord) = chord else {
                break;
            };
            if let Some(outcome) = self.handle_key(chord).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Checks the lock and, for commands that send the buffer, its length,
    /// then raises the toolbar lock.
    async fn begin(&self, command: Command) -> Result<String> {
        let mut state = self.state.lock().await;
        if !Toolbar::is_enabled(command, state.toolbar_locked) {
            drop(state);
            return Err(self.fail(SessionError::toolbar_locked(command)));
        }
        if command.needs_query()
            && !buffer::is_runnable(&state.query, self.settings.min_query_length)
        {
            drop(state);
            return Err(self.fail(SessionError::no_query(self.settings.min_query_length)));
        }
        state.toolbar_locked = true;
        let query = state.query.clone();
        drop(state);
        self.publish(SessionEvent::lock_changed(true));
        Ok(query)
    }

    /// Releases the lock after a failed multi-call operation.
    async fn abort(&self, err: SessionError) -> SessionError {
        self.state.lock().await.toolbar_locked = false;
        self.publish(SessionEvent::lock_changed(false));
        self.fail(err)
    }

    fn transition(&self, state: &mut SessionState, to: SessionPhase) -> SessionPhase {
        let from = state.phase;
        debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
        state.phase = to;
        let has_result = state.last_result.is_some();
        state.panes.update(to, has_result, Instant::now());
        info!(route = %self.route, %from, %to, "Session phase changed");
        from
    }

    fn finish(&self, from: SessionPhase, to: SessionPhase, slots: &[(ResultSlot, usize)]) {
        self.publish(SessionEvent::lock_changed(false));
        for (slot, rows) in slots {
            self.publish(SessionEvent::result_updated(*slot, *rows));
        }
        self.publish(SessionEvent::phase_changed(from, to));
    }

    fn publish(&self, event: SessionEvent) {
        if !self.is_disposed() {
            self.events.send(event);
        }
    }

    fn fail(&self, err: SessionError) -> SessionError {
        if err.is_surfaced() {
            warn!(route = %self.route, error = %err, "Session operation failed");
            self.publish(SessionEvent::error(&err));
        }
        err
    }
}
