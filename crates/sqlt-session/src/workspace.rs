//! Sibling navigation between exercises of one topic.
//!
//! A [`Workspace`] owns the current [`Session`]. Navigating saves the buffer
//! in the background, disposes the old session (deregistering its keyboard
//! listener and silencing its events, even if a call is still in flight) and
//! builds a fresh one at `New`.

use std::sync::Arc;

use tracing::info;

use crate::client::ExerciseClient;
use crate::commands::KeyboardHub;
use crate::error::{Result, SessionError};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::phase::SessionPhase;
use crate::progress::{TopicProgress, UserExercise};
use crate::session::{ExerciseRoute, Session, SessionSeed, SessionSettings};

/// The learner's view of one topic, one exercise at a time.
pub struct Workspace {
    client: Arc<dyn ExerciseClient>,
    settings: SessionSettings,
    hub: KeyboardHub,
    events: EventBroadcaster,
    progress: TopicProgress,
    session: Session,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("session", &self.session)
            .field("exercises", &self.progress.exercises().len())
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Opens the workspace on `route`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if the topic's exercise list is
    /// known and does not contain the route.
    pub fn open(
        route: ExerciseRoute,
        client: Arc<dyn ExerciseClient>,
        settings: SessionSettings,
        progress: TopicProgress,
        record: Option<UserExercise>,
        hub: KeyboardHub,
        events: EventBroadcaster,
    ) -> Result<Self> {
        ensure_known(&progress, &route)?;
        let session = build_session(
            route,
            &client,
            &settings,
            progress.clone(),
            record,
            &hub,
            &events,
        );
        Ok(Self {
            client,
            settings,
            hub,
            events,
            progress,
            session,
        })
    }

    /// The current session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The keyboard hub sessions listen on.
    #[must_use]
    pub const fn keyboard(&self) -> &KeyboardHub {
        &self.hub
    }

    /// The broadcaster every session of this workspace publishes to.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// The exercises of the topic and their last known states.
    #[must_use]
    pub const fn progress(&self) -> &TopicProgress {
        &self.progress
    }

    /// Route of the previous exercise, if the topic has one.
    #[must_use]
    pub fn previous_route(&self) -> Option<ExerciseRoute> {
        let route = self.session.route();
        let target = route.exercise.checked_sub(1)?;
        self.progress
            .contains(target)
            .then(|| route.sibling(target))
    }

    /// Route of the next exercise, if the topic has one.
    #[must_use]
    pub fn next_route(&self) -> Option<ExerciseRoute> {
        let route = self.session.route();
        let target = route.exercise.checked_add(1)?;
        self.progress
            .contains(target)
            .then(|| route.sibling(target))
    }

    /// Moves to another exercise of the same topic.
    ///
    /// `record` seeds the new session's buffer and favorite flag.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if the topic has no such
    /// exercise. The current session is left untouched in that case.
    pub async fn navigate(&mut self, exercise: u32, record: Option<UserExercise>) -> Result<()> {
        let target = self.session.route().sibling(exercise);
        ensure_known(&self.progress, &target)?;

        let old = self.session.snapshot().await;
        self.session.persist_buffer(old.query).await;
        self.progress = self.session.progress().await;
        self.session.dispose().await;

        let session = build_session(
            target,
            &self.client,
            &self.settings,
            self.progress.clone(),
            record,
            &self.hub,
            &self.events,
        );
        self.session = session;

        info!(from = %old.route, to = %self.session.route(), "Navigated");
        if old.phase.can_transition_to(SessionPhase::New) {
            self.events
                .send(SessionEvent::phase_changed(old.phase, SessionPhase::New));
        }
        Ok(())
    }

    /// Moves to the previous exercise.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if there is none.
    pub async fn previous(&mut self, record: Option<UserExercise>) -> Result<()> {
        let route = self.session.route().clone();
        let target = route
            .exercise
            .checked_sub(1)
            .ok_or_else(|| SessionError::unknown_exercise(&route.topic, 0))?;
        self.navigate(target, record).await
    }

    /// Moves to the next exercise.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownExercise` if there is none.
    pub async fn next(&mut self, record: Option<UserExercise>) -> Result<()> {
        let route = self.session.route().clone();
        let target = route.exercise.saturating_add(1);
        self.navigate(target, record).await
    }
}

fn ensure_known(progress: &TopicProgress, route: &ExerciseRoute) -> Result<()> {
    if progress.exercises().is_empty() || progress.contains(route.exercise) {
        Ok(())
    } else {
        Err(SessionError::unknown_exercise(&route.topic, route.exercise))
    }
}

fn build_session(
    route: ExerciseRoute,
    client: &Arc<dyn ExerciseClient>,
    settings: &SessionSettings,
    progress: TopicProgress,
    record: Option<UserExercise>,
    hub: &KeyboardHub,
    events: &EventBroadcaster,
) -> Session {
    let (query, favorite) = record.map_or((String::new(), false), |r| {
        (r.buffer_save.unwrap_or_default(), r.favorite)
    });
    let seed = SessionSeed {
        query,
        favorite,
        progress,
    };
    Session::new(
        route,
        Arc::clone(client),
        settings.clone(),
        seed,
        events.clone(),
    )
    .with_keyboard(hub)
}
