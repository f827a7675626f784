// src/services/authoring.rs

use std::collections::HashSet;

use serde_json::json;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        assignment::{QuizAssignment, quiz_type},
        paths,
        question::QuizQuestion,
    },
    store::{Direction, Document, FieldTransform, Query, StoreError, TxRunner, WriteBatch},
};

/// Quiz CRUD. The only concurrency concern here is the pool counter.
#[derive(Clone)]
pub struct Authoring {
    runner: TxRunner,
}

/// Inputs of a new quiz, after request validation.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub instructions: Option<String>,
    pub pool: Vec<QuizQuestion>,
    pub num_questions: Option<u32>,
    pub points: Option<u32>,
}

fn assignment_from(doc: &Document) -> Result<QuizAssignment, AppError> {
    let mut assignment: QuizAssignment = doc.parse()?;
    assignment.id = doc.id().to_string();
    Ok(assignment)
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Rejects pools that could not be drawn from or graded.
pub fn validate_pool(pool: &[QuizQuestion]) -> Result<(), AppError> {
    if pool.is_empty() {
        return Err(AppError::BadRequest("Question pool cannot be empty".to_string()));
    }
    let mut seen = HashSet::new();
    for question in pool {
        paths::validate_id("question id", &question.id)?;
        if !seen.insert(question.id.as_str()) {
            return Err(AppError::BadRequest(format!("Duplicate question id '{}'", question.id)));
        }
        question.check_answer_key().map_err(AppError::BadRequest)?;
    }
    Ok(())
}

impl Authoring {
    pub fn new(runner: TxRunner) -> Self {
        Self { runner }
    }

    pub async fn create_quiz(&self, class_id: &str, created_by: &str, quiz: NewQuiz) -> Result<QuizAssignment, AppError> {
        paths::validate_id("classId", class_id)?;
        let title = quiz.title.trim();
        if title.is_empty() {
            return Err(AppError::BadRequest("Title is required".to_string()));
        }
        validate_pool(&quiz.pool)?;

        let store = self.runner.store();
        if store.get(&paths::class(class_id)).await?.is_none() {
            return Err(AppError::NotFound(format!("Class {class_id} not found")));
        }

        let pool_size = u32::try_from(quiz.pool.len()).unwrap_or(u32::MAX);
        let assignment = QuizAssignment {
            id: Uuid::new_v4().to_string(),
            class_id: class_id.to_string(),
            title: title.to_string(),
            assignment_type: quiz_type(),
            instructions: quiz.instructions,
            created_by: created_by.to_string(),
            created_at: None,
            updated_at: None,
            num_questions: quiz.num_questions.unwrap_or(pool_size).min(pool_size),
            points: quiz.points.unwrap_or(pool_size),
            pool: quiz.pool,
        };

        let path = paths::assignment(class_id, &assignment.id);
        let mut batch = WriteBatch::new(store.clone());
        batch.set(
            &path,
            &assignment,
            vec![
                FieldTransform::server_timestamp("createdAt"),
                FieldTransform::server_timestamp("updatedAt"),
            ],
        )?;
        batch.commit().await?;
        tracing::info!(class_id, assignment_id = %assignment.id, "quiz created");

        self.assignment(class_id, &assignment.id).await
    }

    pub async fn assignment(&self, class_id: &str, assignment_id: &str) -> Result<QuizAssignment, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("assignmentId", assignment_id)?;
        match self.runner.store().get(&paths::assignment(class_id, assignment_id)).await? {
            Some(doc) => assignment_from(&doc),
            None => Err(AppError::NotFound("Assignment not found".to_string())),
        }
    }

    /// Assignments of a class, newest first.
    pub async fn assignments(&self, class_id: &str) -> Result<Vec<QuizAssignment>, AppError> {
        paths::validate_id("classId", class_id)?;
        let docs = self
            .runner
            .store()
            .query(&Query::collection(paths::assignments(class_id)).order_by("createdAt", Direction::Descending))
            .await?;
        docs.iter().map(assignment_from).collect()
    }

    /// Appends a question to the pool and grows `numQuestions` by one.
    pub async fn add_question(
        &self,
        class_id: &str,
        assignment_id: &str,
        question: QuizQuestion,
    ) -> Result<QuizAssignment, AppError> {
        validate_pool(std::slice::from_ref(&question))?;
        let current = self.assignment(class_id, assignment_id).await?;
        if current.question(&question.id).is_some() {
            return Err(AppError::BadRequest(format!("Duplicate question id '{}'", question.id)));
        }

        let mut batch = WriteBatch::new(self.runner.store().clone());
        batch.update(
            &paths::assignment(class_id, assignment_id),
            vec![
                FieldTransform::array_union("pool", vec![to_value(&question)?]),
                FieldTransform::increment("numQuestions", 1),
                FieldTransform::server_timestamp("updatedAt"),
            ],
        );
        match batch.commit().await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(AppError::NotFound("Assignment not found".to_string())),
            Err(e) => return Err(e.into()),
        }

        self.assignment(class_id, assignment_id).await
    }

    /// Removes a question by id and shrinks `numQuestions`, never below zero.
    pub async fn remove_question(
        &self,
        class_id: &str,
        assignment_id: &str,
        question_id: &str,
    ) -> Result<QuizAssignment, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("assignmentId", assignment_id)?;
        let path = &paths::assignment(class_id, assignment_id);

        self.runner
            .run::<_, AppError, _, _>(|tx| async move {
                let Some(doc) = tx.get(path).await? else {
                    return Err(AppError::NotFound("Assignment not found".to_string()));
                };
                let assignment = assignment_from(&doc)?;
                if assignment.question(question_id).is_none() {
                    return Err(AppError::NotFound(format!("Question '{question_id}' not found")));
                }

                let pool: Vec<&QuizQuestion> = assignment.pool.iter().filter(|q| q.id != question_id).collect();
                tx.update(
                    path,
                    vec![
                        FieldTransform::set("pool", to_value(&pool)?),
                        FieldTransform::set("numQuestions", json!(assignment.num_questions.saturating_sub(1))),
                        FieldTransform::server_timestamp("updatedAt"),
                    ],
                )?;
                Ok(())
            })
            .await?;

        self.assignment(class_id, assignment_id).await
    }
}
