// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Kind of a quiz question. Drives both answer capture and grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "mcq-single")]
    McqSingle,
    #[serde(rename = "mcq-multi")]
    McqMulti,
    #[serde(rename = "text")]
    Text,
}

/// One entry of an assignment's question pool.
///
/// Legacy questions carry only `choices` + `correctIndex` and no `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    #[validate(length(min = 1, max = 128))]
    pub id: String,

    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<QuestionKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = validate_choices))]
    pub choices: Option<Vec<String>>,

    /// Correct choice for single-choice questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<u32>,

    /// Legacy spelling of `correct`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_multi: Option<Vec<u32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_text: Option<String>,
}

fn validate_choices(choices: &[String]) -> Result<(), validator::ValidationError> {
    if choices.is_empty() {
        return Err(validator::ValidationError::new("choices_cannot_be_empty"));
    }
    for choice in choices {
        if choice.len() > 500 {
            return Err(validator::ValidationError::new("choice_too_long"));
        }
    }
    Ok(())
}

impl QuizQuestion {
    /// Declared kind, or `mcq-single` for legacy questions with choices.
    pub fn effective_kind(&self) -> Option<QuestionKind> {
        match (self.kind, &self.choices) {
            (Some(kind), _) => Some(kind),
            (None, Some(_)) => Some(QuestionKind::McqSingle),
            (None, None) => None,
        }
    }

    pub fn expected_single(&self) -> Option<u32> {
        self.correct.or(self.correct_index)
    }

    /// Checks that the correctness data matching the kind is present and in range.
    pub fn check_answer_key(&self) -> Result<(), String> {
        let choice_count = self.choices.as_ref().map_or(0, Vec::len);
        let in_range = |i: u32| (i as usize) < choice_count;

        match self.effective_kind() {
            None => Err(format!("Question '{}' has no kind and no choices", self.id)),
            Some(QuestionKind::McqSingle) => match self.expected_single() {
                Some(i) if in_range(i) => Ok(()),
                Some(_) => Err(format!("Question '{}' has an out-of-range correct choice", self.id)),
                None => Err(format!("Question '{}' needs a correct choice", self.id)),
            },
            Some(QuestionKind::McqMulti) => match &self.correct_multi {
                Some(set) if !set.is_empty() && set.iter().all(|&i| in_range(i)) => Ok(()),
                Some(_) => Err(format!("Question '{}' has an invalid set of correct choices", self.id)),
                None => Err(format!("Question '{}' needs correct choices", self.id)),
            },
            Some(QuestionKind::Text) => match &self.correct_text {
                Some(text) if !text.trim().is_empty() => Ok(()),
                _ => Err(format!("Question '{}' needs a correct text", self.id)),
            },
        }
    }
}

/// DTO for sending a question to a student (excludes correctness data).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub prompt: String,
    pub kind: Option<QuestionKind>,
    pub choices: Option<Vec<String>>,
}

impl From<&QuizQuestion> for PublicQuestion {
    fn from(question: &QuizQuestion) -> Self {
        Self {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            kind: question.effective_kind(),
            choices: question.choices.clone(),
        }
    }
}
