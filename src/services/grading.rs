// src/services/grading.rs

use std::collections::HashMap;

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::models::{
    assignment::QuizAssignment,
    attempt::{Answer, QuizAttempt},
    question::{QuestionKind, QuizQuestion},
};

/// Canonical form used for free-text comparison: trimmed, case-folded,
/// with combining diacritical marks removed after NFD decomposition.
pub fn normalize_text(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Whether `answer` is correct for `question`.
pub fn is_correct(question: &QuizQuestion, answer: &Answer) -> bool {
    match (question.effective_kind(), answer) {
        (Some(QuestionKind::McqSingle), Answer::Single(choice)) => {
            question.expected_single() == Some(*choice)
        }
        (Some(QuestionKind::McqMulti), Answer::Multi(submitted)) => {
            let Some(expected) = &question.correct_multi else {
                return false;
            };
            let mut expected = expected.clone();
            let mut submitted = submitted.clone();
            expected.sort_unstable();
            submitted.sort_unstable();
            expected == submitted
        }
        (Some(QuestionKind::Text), Answer::Text(text)) => question
            .correct_text
            .as_deref()
            .is_some_and(|correct| normalize_text(correct) == normalize_text(text)),
        _ => false,
    }
}

/// Number of correctly answered selected questions.
///
/// Selected ids missing from the pool are skipped.
pub fn grade(assignment: &QuizAssignment, attempt: &QuizAttempt) -> u32 {
    let lookup: HashMap<&str, &QuizQuestion> =
        assignment.pool.iter().map(|q| (q.id.as_str(), q)).collect();

    let correct = attempt
        .selected_ids
        .iter()
        .enumerate()
        .filter_map(|(slot, id)| {
            let question = lookup.get(id.as_str())?;
            let answer = attempt.answers.get(slot).unwrap_or(&Answer::Unanswered);
            is_correct(question, answer).then_some(())
        })
        .count();

    u32::try_from(correct).unwrap_or(u32::MAX)
}
