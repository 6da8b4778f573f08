//! Per-topic exercise states and the topic-completion rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Grading state of one exercise for the current learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseState {
    /// Never checked.
    #[default]
    Default,
    /// Last check was correct.
    Correct,
    /// Last check was wrong.
    Wrong,
}

impl ExerciseState {
    /// State from a server-side `is_correct` flag.
    #[must_use]
    pub const fn from_is_correct(is_correct: Option<bool>) -> Self {
        match is_correct {
            None => Self::Default,
            Some(true) => Self::Correct,
            Some(false) => Self::Wrong,
        }
    }
}

/// An exercise as listed for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseInfo {
    /// Server-side exercise id.
    pub id: u64,
    /// Exercise number within its topic.
    pub enumber: u32,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
}

/// The learner's server-side record for one exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserExercise {
    /// Server-side exercise id this record belongs to.
    pub exercise: u64,
    /// Grading outcome, absent if never checked.
    #[serde(default)]
    pub is_correct: Option<bool>,
    /// Favorite flag.
    #[serde(default, rename = "favourite")]
    pub favorite: bool,
    /// Last persisted editor buffer.
    #[serde(default)]
    pub buffer_save: Option<String>,
}

/// Exercise list and grading states for one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicProgress {
    exercises: Vec<ExerciseInfo>,
    states: BTreeMap<u32, ExerciseState>,
}

impl TopicProgress {
    /// Creates progress for a topic with no recorded states.
    #[must_use]
    pub fn new(exercises: Vec<ExerciseInfo>) -> Self {
        let mut exercises = exercises;
        exercises.sort_by_key(|e| e.enumber);
        Self {
            exercises,
            states: BTreeMap::new(),
        }
    }

    /// Creates progress from the exercise list and the learner's records.
    ///
    /// Records for exercises outside the list are ignored.
    #[must_use]
    pub fn from_records(exercises: Vec<ExerciseInfo>, records: &[UserExercise]) -> Self {
        let mut progress = Self::new(exercises);
        for record in records {
            if let Some(enumber) = progress.enumber_of(record.exercise) {
                progress
                    .states
                    .insert(enumber, ExerciseState::from_is_correct(record.is_correct));
            }
        }
        progress
    }

    fn enumber_of(&self, id: u64) -> Option<u32> {
        self.exercises
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.enumber)
    }

    /// Exercises of the topic, ordered by number.
    #[must_use]
    pub fn exercises(&self) -> &[ExerciseInfo] {
        &self.exercises
    }

    /// Returns `true` if the topic contains exercise `enumber`.
    #[must_use]
    pub fn contains(&self, enumber: u32) -> bool {
        self.exercises.iter().any(|e| e.enumber == enumber)
    }

    /// Recorded state of an exercise.
    #[must_use]
    pub fn state(&self, enumber: u32) -> ExerciseState {
        self.states.get(&enumber).copied().unwrap_or_default()
    }

    /// Records the outcome of a check.
    pub fn record(&mut self, enumber: u32, correct: bool) {
        let state = if correct {
            ExerciseState::Correct
        } else {
            ExerciseState::Wrong
        };
        self.states.insert(enumber, state);
    }

    /// Returns `true` if a correct check of `enumber` completes the topic.
    ///
    /// Every exercise must have a record and every exercise other than
    /// `enumber` must already be correct.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlt_session::{ExerciseInfo, TopicProgress};
    ///
    /// let exercises = (1..=2)
    ///     .map(|n| ExerciseInfo { id: u64::from(n), enumber: n, title: None })
    ///     .collect();
    /// let mut progress = TopicProgress::new(exercises);
    /// progress.record(1, true);
    /// progress.record(2, true);
    /// assert!(progress.completes_topic(2, true));
    /// assert!(!progress.completes_topic(2, false));
    /// ```
    #[must_use]
    pub fn completes_topic(&self, enumber: u32, correct: bool) -> bool {
        if !correct || self.exercises.is_empty() || self.states.len() != self.exercises.len() {
            return false;
        }
        self.exercises
            .iter()
            .filter(|e| e.enumber != enumber)
            .all(|e| self.state(e.enumber) == ExerciseState::Correct)
    }

    /// Badge shown for an exercise in the topic menu.
    ///
    /// Once the learner has submitted a natural join in this session every
    /// badge reads `Wrong`, whatever the recorded state.
    #[must_use]
    pub fn badge(&self, enumber: u32, natural_join: bool) -> ExerciseState {
        if natural_join {
            ExerciseState::Wrong
        } else {
            self.state(enumber)
        }
    }

    /// Number of correctly solved exercises.
    #[must_use]
    pub fn solved_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == ExerciseState::Correct)
            .count()
    }
}
