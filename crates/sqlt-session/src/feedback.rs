//! Transient feedback shown after an answer check.
//!
//! Most checks get one of ten neutral messages for their polarity. With a
//! configurable 1-in-N chance one of twenty easter-egg messages is picked
//! instead.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Whether feedback praises or corrects the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// The answer was correct.
    Positive,
    /// The answer was wrong.
    Negative,
}

impl Polarity {
    /// Polarity for a graded answer.
    #[must_use]
    pub const fn from_correct(correct: bool) -> Self {
        if correct {
            Self::Positive
        } else {
            Self::Negative
        }
    }

    /// Returns `true` for [`Polarity::Positive`].
    #[must_use]
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::Positive)
    }
}

/// A feedback message waiting to be displayed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// The message text.
    pub message: String,
    /// Whether this is praise or correction.
    pub polarity: Polarity,
    /// Extra hint from the grader, e.g. a missing mandatory keyword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Feedback {
    /// Full text with the grader's detail appended, if any.
    #[must_use]
    pub fn full_text(&self) -> String {
        match &self.detail {
            Some(detail) if !detail.trim().is_empty() => format!("{} {}", self.message, detail.trim()),
            _ => self.message.clone(),
        }
    }
}

const POSITIVE_NEUTRAL: [&str; 10] = [
    "Correct! Well done.",
    "That's right, your result matches the solution.",
    "Correct answer.",
    "Nice work, the query is correct.",
    "Well done, that's the expected result.",
    "Correct, on to the next one!",
    "Your query returns exactly the right rows.",
    "Spot on.",
    "Great, this exercise is solved.",
    "Correct. Keep going!",
];

const NEGATIVE_NEUTRAL: [&str; 10] = [
    "Not quite, compare your result with the solution.",
    "That's not correct yet.",
    "The result differs from the expected one.",
    "Almost, check the highlighted rows and columns.",
    "Incorrect, give it another try.",
    "Your result does not match the solution.",
    "Not yet, take a closer look at the query.",
    "Wrong answer, the marked cells show the difference.",
    "Keep trying, you're on your way.",
    "That's not it, try again.",
];

const POSITIVE_EASTER_EGGS: [&str; 20] = [
    "SELECT applause FROM audience;",
    "Your query is so clean, the optimizer sent a thank-you note.",
    "Codd would be proud.",
    "Zero rows of doubt: that's correct!",
    "COMMIT; that answer is going into the history books.",
    "You joined those tables like a pro.",
    "The database nodded approvingly.",
    "Correct! Even the query planner is impressed.",
    "Achievement unlocked: relational wizard.",
    "ACID test passed: Awesome, Correct, Impressive, Done.",
    "That query deserves its own index.",
    "No NULLs in your knowledge today.",
    "Primary key to success: found.",
    "Your WHERE clause is exactly where it should be.",
    "Normalized to perfection.",
    "GROUP BY excellence HAVING count(*) > 9000.",
    "Flawless. Not even a full table scan of mistakes.",
    "ORDER BY greatness DESC: you're first.",
    "That answer is fully consistent.",
    "The sandbox is cheering for you.",
];

const NEGATIVE_EASTER_EGGS: [&str; 20] = [
    "ROLLBACK; let's pretend that never happened.",
    "The rows went on a vacation without you.",
    "Your query took the scenic route.",
    "Even a Cartesian product would blush.",
    "NULL points, but a non-NULL amount of effort.",
    "The query planner is confused, and so are we.",
    "Close, but the database says: 404 correctness not found.",
    "That's a LEFT turn where you needed a RIGHT.",
    "Not quite. Have you tried turning the JOIN off and on again?",
    "Somewhere a foreign key is crying.",
    "DISTINCTly not the right answer.",
    "Your WHERE clause wandered off.",
    "Error 42: answer not found.",
    "That result needs a little more GROUP therapy.",
    "The rows are there, they're just not the right ones.",
    "A bold query. Bold, but wrong.",
    "Missing rows have filed a complaint.",
    "Try again: the sandbox believes in you.",
    "Transaction aborted: confidence too high.",
    "Almost! The database gives you partial credit (not really).",
];

/// Returns the ten neutral messages for a polarity.
#[must_use]
pub const fn neutral_messages(polarity: Polarity) -> &'static [&'static str; 10] {
    match polarity {
        Polarity::Positive => &POSITIVE_NEUTRAL,
        Polarity::Negative => &NEGATIVE_NEUTRAL,
    }
}

/// Returns the twenty easter-egg messages for a polarity.
#[must_use]
pub const fn easter_egg_messages(polarity: Polarity) -> &'static [&'static str; 20] {
    match polarity {
        Polarity::Positive => &POSITIVE_EASTER_EGGS,
        Polarity::Negative => &NEGATIVE_EASTER_EGGS,
    }
}

/// Picks feedback messages for graded answers.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackPicker {
    easter_egg_one_in: u32,
}

impl FeedbackPicker {
    /// Creates a picker with a 1-in-`easter_egg_one_in` easter-egg chance.
    ///
    /// A value of `0` is treated as `1`.
    #[must_use]
    pub fn new(easter_egg_one_in: u32) -> Self {
        Self {
            easter_egg_one_in: easter_egg_one_in.max(1),
        }
    }

    /// Picks a message using the thread-local RNG.
    #[must_use]
    pub fn pick(&self, correct: bool, detail: Option<String>) -> Feedback {
        self.pick_with(&mut rand::thread_rng(), correct, detail)
    }

    /// Picks a message using the given RNG.
    pub fn pick_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        correct: bool,
        detail: Option<String>,
    ) -> Feedback {
        let polarity = Polarity::from_correct(correct);
        let message = if rng.gen_range(0..self.easter_egg_one_in) == 0 {
            let eggs = easter_egg_messages(polarity);
            eggs[rng.gen_range(0..eggs.len())]
        } else {
            let neutral = neutral_messages(polarity);
            neutral[rng.gen_range(0..neutral.len())]
        };
        Feedback {
            message: message.to_string(),
            polarity,
            detail,
        }
    }
}

impl Default for FeedbackPicker {
    fn default() -> Self {
        Self::new(10)
    }
}
