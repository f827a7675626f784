// src/models/assignment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::question::QuizQuestion;

/// Represents a `classes/{classId}/assignments/{id}` quiz document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAssignment {
    #[serde(default)]
    pub id: String,
    pub class_id: String,
    pub title: String,

    /// Always "quiz"; kept for readers that list mixed assignment types.
    #[serde(rename = "type", default = "quiz_type")]
    pub assignment_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default)]
    pub created_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub pool: Vec<QuizQuestion>,

    /// Size of the subset each attempt draws.
    #[serde(default)]
    pub num_questions: u32,

    #[serde(default)]
    pub points: u32,
}

pub fn quiz_type() -> String {
    "quiz".to_string()
}

impl QuizAssignment {
    pub fn question(&self, id: &str) -> Option<&QuizQuestion> {
        self.pool.iter().find(|q| q.id == id)
    }
}

/// DTO for creating a quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(length(max = 5000))]
    pub instructions: Option<String>,

    #[validate(length(min = 1, message = "Question pool cannot be empty"), nested)]
    pub pool: Vec<QuizQuestion>,

    pub num_questions: Option<u32>,
    pub points: Option<u32>,
}

/// Attempts with recorded progress per assignment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptCount {
    pub assignment_id: String,
    pub count: usize,
}
