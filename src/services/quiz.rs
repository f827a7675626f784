// src/services/quiz.rs

//! Attempt lifecycle: `unstarted` -> `in-progress` -> `graded`.
//!
//! Every transition is a transaction over the attempt document (and the
//! assignment it draws from), so concurrent starts or saves serialize
//! through optimistic retry instead of overwriting each other.

use rand::seq::SliceRandom;
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        assignment::{AttemptCount, QuizAssignment},
        attempt::{Answer, AttemptView, AttemptWithMember, QuizAttempt},
        class::ClassMember,
        paths,
        question::{PublicQuestion, QuestionKind, QuizQuestion},
        user::UserProfile,
    },
    store::{DocPath, Document, FieldTransform, Query, TxRunner},
};

use super::{cascade, grading};

#[derive(Clone)]
pub struct QuizEngine {
    runner: TxRunner,
}

/// Uniformly shuffled, duplicate-free draw of `min(num_questions, pool)` ids.
pub fn draw_questions(pool: &[QuizQuestion], num_questions: u32) -> Vec<String> {
    let mut ids: Vec<String> = pool.iter().map(|q| q.id.clone()).collect();
    ids.sort();
    ids.dedup();
    ids.shuffle(&mut rand::thread_rng());
    ids.truncate(num_questions as usize);
    ids
}

fn attempt_from(doc: &Document) -> Result<QuizAttempt, AppError> {
    let mut attempt: QuizAttempt = doc.parse()?;
    attempt.uid = doc.id().to_string();
    Ok(attempt)
}

fn assignment_from(doc: Option<Document>) -> Result<QuizAssignment, AppError> {
    match doc {
        Some(doc) => {
            let mut assignment: QuizAssignment = doc.parse()?;
            assignment.id = doc.id().to_string();
            Ok(assignment)
        }
        None => Err(AppError::NotFound("Assignment not found".to_string())),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::InternalServerError(e.to_string()))
}

fn kind_label(kind: QuestionKind) -> &'static str {
    match kind {
        QuestionKind::McqSingle => "mcq-single",
        QuestionKind::McqMulti => "mcq-multi",
        QuestionKind::Text => "text",
    }
}

impl QuizEngine {
    pub fn new(runner: TxRunner) -> Self {
        Self { runner }
    }

    async fn load_attempt(&self, path: &DocPath) -> Result<Option<QuizAttempt>, AppError> {
        match self.runner.store().get(path).await? {
            Some(doc) => Ok(Some(attempt_from(&doc)?)),
            None => Ok(None),
        }
    }

    async fn stored_attempt(&self, path: &DocPath) -> Result<QuizAttempt, AppError> {
        self.load_attempt(path)
            .await?
            .ok_or_else(|| AppError::InternalServerError(format!("Attempt {path} vanished after commit")))
    }

    /// Creates the attempt with its question draw, once. Later calls return
    /// the stored attempt untouched.
    pub async fn start_attempt_if_needed(
        &self,
        class_id: &str,
        assignment_id: &str,
        uid: &str,
    ) -> Result<QuizAttempt, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("assignmentId", assignment_id)?;
        paths::validate_id("uid", uid)?;

        let assignment_path = &paths::assignment(class_id, assignment_id);
        let attempt_path = &paths::attempt(class_id, assignment_id, uid);

        let created = self
            .runner
            .run::<_, AppError, _, _>(|tx| async move {
                let assignment = assignment_from(tx.get(assignment_path).await?)?;
                let existing = match tx.get(attempt_path).await? {
                    Some(doc) => Some(attempt_from(&doc)?),
                    None => None,
                };
                if existing
                    .as_ref()
                    .is_some_and(|a| a.is_graded() || !a.selected_ids.is_empty())
                {
                    return Ok(false);
                }

                let selected_ids = draw_questions(&assignment.pool, assignment.num_questions);
                let mut answers = existing.map(|a| a.answers).unwrap_or_default();
                answers.resize(selected_ids.len(), Answer::Unanswered);

                tx.set_merge(
                    attempt_path,
                    &json!({
                        "uid": uid,
                        "selectedIds": selected_ids,
                        "answers": to_value(&answers)?,
                        "score": null,
                    }),
                    vec![
                        FieldTransform::server_timestamp("startedAt"),
                        FieldTransform::server_timestamp("updatedAt"),
                    ],
                )?;
                Ok(true)
            })
            .await?;

        if created {
            tracing::info!(class_id, assignment_id, uid, "attempt started");
        }
        self.stored_attempt(attempt_path).await
    }

    /// Rewrites one answer slot transactionally so saves to other slots survive.
    async fn save_slot<F>(
        &self,
        class_id: &str,
        assignment_id: &str,
        uid: &str,
        index: usize,
        expected: QuestionKind,
        next: F,
    ) -> Result<QuizAttempt, AppError>
    where
        F: Fn(&Answer) -> Answer,
    {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("assignmentId", assignment_id)?;
        paths::validate_id("uid", uid)?;

        let assignment_path = &paths::assignment(class_id, assignment_id);
        let attempt_path = &paths::attempt(class_id, assignment_id, uid);
        let next = &next;

        self.runner
            .run::<_, AppError, _, _>(|tx| async move {
                let assignment = assignment_from(tx.get(assignment_path).await?)?;
                let attempt = match tx.get(attempt_path).await? {
                    Some(doc) => attempt_from(&doc)?,
                    None => QuizAttempt::default(),
                };
                if attempt.is_graded() {
                    return Err(AppError::Conflict("Attempt already submitted".to_string()));
                }

                let slots = if attempt.selected_ids.is_empty() {
                    assignment.pool.len()
                } else {
                    attempt.selected_ids.len()
                };
                if index >= slots {
                    return Err(AppError::BadRequest(format!("Answer index {index} is out of range")));
                }
                if let Some(kind) = attempt
                    .selected_ids
                    .get(index)
                    .and_then(|id| assignment.question(id))
                    .and_then(QuizQuestion::effective_kind)
                {
                    if kind != expected {
                        return Err(AppError::BadRequest(format!(
                            "Question {index} expects a {} answer",
                            kind_label(kind)
                        )));
                    }
                }

                let mut answers = attempt.answers;
                if answers.len() <= index {
                    answers.resize(index + 1, Answer::Unanswered);
                }
                answers[index] = next(&answers[index]);

                tx.set_merge(
                    attempt_path,
                    &json!({ "uid": uid, "answers": to_value(&answers)? }),
                    vec![FieldTransform::server_timestamp("updatedAt")],
                )?;
                Ok(())
            })
            .await?;

        self.stored_attempt(attempt_path).await
    }

    pub async fn save_answer_single(
        &self,
        class_id: &str,
        assignment_id: &str,
        uid: &str,
        index: usize,
        choice: u32,
    ) -> Result<QuizAttempt, AppError> {
        self.save_slot(class_id, assignment_id, uid, index, QuestionKind::McqSingle, |_| {
            Answer::Single(choice)
        })
        .await
    }

    /// Adds `choice` to the slot's set, or removes it if already there.
    pub async fn toggle_answer_multi(
        &self,
        class_id: &str,
        assignment_id: &str,
        uid: &str,
        index: usize,
        choice: u32,
    ) -> Result<QuizAttempt, AppError> {
        self.save_slot(class_id, assignment_id, uid, index, QuestionKind::McqMulti, |current| {
            current.toggled(choice)
        })
        .await
    }

    pub async fn save_answer_text(
        &self,
        class_id: &str,
        assignment_id: &str,
        uid: &str,
        index: usize,
        text: &str,
    ) -> Result<QuizAttempt, AppError> {
        self.save_slot(class_id, assignment_id, uid, index, QuestionKind::Text, |_| {
            Answer::Text(text.to_string())
        })
        .await
    }

    /// Grades the attempt once and stamps submission and grading time.
    pub async fn submit_and_grade(
        &self,
        class_id: &str,
        assignment_id: &str,
        uid: &str,
    ) -> Result<QuizAttempt, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("assignmentId", assignment_id)?;
        paths::validate_id("uid", uid)?;

        let assignment_path = &paths::assignment(class_id, assignment_id);
        let attempt_path = &paths::attempt(class_id, assignment_id, uid);

        let score = self
            .runner
            .run::<_, AppError, _, _>(|tx| async move {
                let assignment = assignment_from(tx.get(assignment_path).await?)?;
                let attempt = match tx.get(attempt_path).await? {
                    Some(doc) => attempt_from(&doc)?,
                    None => return Err(AppError::NotFound("No attempt".to_string())),
                };
                if attempt.is_graded() {
                    return Err(AppError::Conflict("Attempt already submitted".to_string()));
                }
                if attempt.selected_ids.is_empty() {
                    return Err(AppError::Conflict("Attempt not started".to_string()));
                }

                let score = grading::grade(&assignment, &attempt);
                tx.set_merge(
                    attempt_path,
                    &json!({ "score": score }),
                    vec![
                        FieldTransform::server_timestamp("submittedAt"),
                        FieldTransform::server_timestamp("gradedAt"),
                        FieldTransform::server_timestamp("updatedAt"),
                    ],
                )?;
                Ok(score)
            })
            .await?;

        tracing::info!(class_id, assignment_id, uid, score, "attempt graded");
        self.stored_attempt(attempt_path).await
    }

    /// Cascade-deletes the attempts, then the assignment.
    pub async fn delete_assignment(&self, class_id: &str, assignment_id: &str) -> Result<usize, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("assignmentId", assignment_id)?;
        let deleted = cascade::delete_assignment_tree(self.runner.store(), class_id, assignment_id).await?;
        tracing::info!(class_id, assignment_id, attempts = deleted, "assignment deleted");
        Ok(deleted)
    }

    /// The caller's attempt with its drawn questions, answer keys stripped.
    pub async fn attempt_view(&self, class_id: &str, assignment_id: &str, uid: &str) -> Result<AttemptView, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("assignmentId", assignment_id)?;
        let attempt = self
            .load_attempt(&paths::attempt(class_id, assignment_id, uid))
            .await?
            .ok_or_else(|| AppError::NotFound("No attempt".to_string()))?;
        let assignment = assignment_from(
            self.runner
                .store()
                .get(&paths::assignment(class_id, assignment_id))
                .await?,
        )?;

        let questions = attempt
            .selected_ids
            .iter()
            .filter_map(|id| assignment.question(id))
            .map(PublicQuestion::from)
            .collect();
        Ok(AttemptView { attempt, questions })
    }

    /// Attempts with recorded progress.
    pub async fn attempts_for_assignment(&self, class_id: &str, assignment_id: &str) -> Result<Vec<QuizAttempt>, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("assignmentId", assignment_id)?;
        let docs = self
            .runner
            .store()
            .query(&Query::collection(paths::attempts(class_id, assignment_id)))
            .await?;

        let mut attempts = Vec::with_capacity(docs.len());
        for doc in &docs {
            let attempt = attempt_from(doc)?;
            if attempt.has_progress() {
                attempts.push(attempt);
            }
        }
        Ok(attempts)
    }

    /// Number of attempts with progress, per assignment of the class.
    pub async fn attempt_counts(&self, class_id: &str) -> Result<Vec<AttemptCount>, AppError> {
        paths::validate_id("classId", class_id)?;
        let assignments = self
            .runner
            .store()
            .query(&Query::collection(paths::assignments(class_id)))
            .await?;

        let mut counts = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            let count = self.attempts_for_assignment(class_id, assignment.id()).await?.len();
            counts.push(AttemptCount {
                assignment_id: assignment.id().to_string(),
                count,
            });
        }
        Ok(counts)
    }

    /// Attempts joined with the member record and profile of their owner.
    pub async fn attempts_with_members(
        &self,
        class_id: &str,
        assignment_id: &str,
    ) -> Result<Vec<AttemptWithMember>, AppError> {
        let attempts = self.attempts_for_assignment(class_id, assignment_id).await?;
        let store = self.runner.store();

        let mut rows = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            let member = match store.get(&paths::member(class_id, &attempt.uid)).await? {
                Some(doc) => {
                    let mut member: ClassMember = doc.parse()?;
                    member.uid = doc.id().to_string();
                    Some(member)
                }
                None => None,
            };
            let user = match store.get(&paths::user(&attempt.uid)).await? {
                Some(doc) => {
                    let mut user: UserProfile = doc.parse()?;
                    user.uid = doc.id().to_string();
                    Some(user)
                }
                None => None,
            };
            rows.push(AttemptWithMember { attempt, member, user });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn pool(n: usize) -> Vec<QuizQuestion> {
        (0..n)
            .map(|i| {
                serde_json::from_value(json!({
                    "id": format!("q{i}"),
                    "prompt": "p",
                    "kind": "text",
                    "correctText": "x"
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_draw_is_duplicate_free_subset() {
        let pool = pool(10);
        let drawn = draw_questions(&pool, 4);
        assert_eq!(drawn.len(), 4);
        let unique: HashSet<_> = drawn.iter().collect();
        assert_eq!(unique.len(), 4);
        assert!(drawn.iter().all(|id| pool.iter().any(|q| &q.id == id)));
    }

    #[test]
    fn test_draw_is_capped_by_pool() {
        assert_eq!(draw_questions(&pool(3), 10).len(), 3);
        assert!(draw_questions(&pool(3), 0).is_empty());
    }
}
