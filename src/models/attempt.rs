// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{class::ClassMember, question::PublicQuestion, user::UserProfile};

/// Stored answer for one slot of an attempt.
///
/// On the wire a slot is a number (single), an array of numbers (multi),
/// a string (text), or `-1`/`null` when unanswered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawAnswer", into = "RawAnswer")]
pub enum Answer {
    #[default]
    Unanswered,
    Single(u32),
    /// Kept sorted ascending and duplicate-free.
    Multi(Vec<u32>),
    Text(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Index(i64),
    Indices(Vec<i64>),
    Text(String),
    Missing(Option<()>),
}

impl From<RawAnswer> for Answer {
    fn from(raw: RawAnswer) -> Self {
        match raw {
            RawAnswer::Index(i) => u32::try_from(i).map_or(Answer::Unanswered, Answer::Single),
            RawAnswer::Indices(indices) => {
                let mut set: Vec<u32> = indices
                    .into_iter()
                    .filter_map(|i| u32::try_from(i).ok())
                    .collect();
                set.sort_unstable();
                set.dedup();
                Answer::Multi(set)
            }
            RawAnswer::Text(text) => Answer::Text(text),
            RawAnswer::Missing(_) => Answer::Unanswered,
        }
    }
}

impl From<Answer> for RawAnswer {
    fn from(answer: Answer) -> Self {
        match answer {
            Answer::Unanswered => RawAnswer::Index(-1),
            Answer::Single(i) => RawAnswer::Index(i64::from(i)),
            Answer::Multi(set) => RawAnswer::Indices(set.into_iter().map(i64::from).collect()),
            Answer::Text(text) => RawAnswer::Text(text),
        }
    }
}

impl Answer {
    pub fn is_answered(&self) -> bool {
        match self {
            Answer::Unanswered => false,
            Answer::Single(_) => true,
            Answer::Multi(set) => !set.is_empty(),
            Answer::Text(text) => !text.is_empty(),
        }
    }

    /// Toggles `choice` in a multi-choice answer. Other shapes start from empty.
    pub fn toggled(&self, choice: u32) -> Answer {
        let mut set = match self {
            Answer::Multi(set) => set.clone(),
            _ => Vec::new(),
        };
        match set.binary_search(&choice) {
            Ok(pos) => {
                set.remove(pos);
            }
            Err(pos) => set.insert(pos, choice),
        }
        Answer::Multi(set)
    }
}

/// Represents a `.../attempts/{uid}` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    #[serde(default)]
    pub uid: String,

    /// Drawn once at start, never reshuffled.
    #[serde(default)]
    pub selected_ids: Vec<String>,

    #[serde(default)]
    pub answers: Vec<Answer>,

    #[serde(default)]
    pub score: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    pub fn is_graded(&self) -> bool {
        self.score.is_some()
    }

    /// Placeholder attempts (nothing answered, not graded) are not real submissions.
    pub fn has_progress(&self) -> bool {
        self.score.is_some() || self.answers.iter().any(Answer::is_answered)
    }
}

/// An attempt together with the questions it drew, stripped of answer keys.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptView {
    pub attempt: QuizAttempt,
    pub questions: Vec<PublicQuestion>,
}

/// One row of the instructor's attempt table.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptWithMember {
    pub attempt: QuizAttempt,
    pub member: Option<ClassMember>,
    pub user: Option<UserProfile>,
}

/// DTO for saving one answer slot.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SaveAnswerRequest {
    /// Overwrites the slot with one choice.
    Single { choice: u32 },
    /// Toggles one choice in the slot's set.
    Multi { choice: u32 },
    Text { text: String },
}
