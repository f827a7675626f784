// src/handlers/assignments.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{assignment::CreateQuizRequest, question::QuizQuestion},
    services::{Services, authoring::NewQuiz},
    utils::jwt::Claims,
};

/// Assignments of a class. Students get them without the question pool.
pub async fn list_assignments(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let member = services.classes.require_member(&class_id, &claims.sub).await?;
    let mut assignments = services.authoring.assignments(&class_id).await?;

    if !member.role.is_staff() {
        for assignment in &mut assignments {
            assignment.pool.clear();
        }
    }
    Ok(Json(assignments))
}

/// Create a quiz assignment.
pub async fn create_quiz(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    services.classes.require_staff(&class_id, &claims.sub).await?;

    let quiz = NewQuiz {
        title: payload.title,
        instructions: payload.instructions,
        pool: payload.pool,
        num_questions: payload.num_questions,
        points: payload.points,
    };
    let assignment = services.authoring.create_quiz(&class_id, &claims.sub, quiz).await?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Full assignment including answer keys (staff only).
pub async fn get_assignment(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_staff(&class_id, &claims.sub).await?;
    let assignment = services.authoring.assignment(&class_id, &assignment_id).await?;
    Ok(Json(assignment))
}

/// Delete an assignment and all its attempts.
pub async fn delete_assignment(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_staff(&class_id, &claims.sub).await?;
    services.quiz.delete_assignment(&class_id, &assignment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Append a question to the pool.
pub async fn add_question(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id)): Path<(String, String)>,
    Json(payload): Json<QuizQuestion>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    services.classes.require_staff(&class_id, &claims.sub).await?;

    let assignment = services
        .authoring
        .add_question(&class_id, &assignment_id, payload)
        .await?;
    Ok(Json(assignment))
}

/// Remove a question from the pool by id.
pub async fn remove_question(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id, question_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_staff(&class_id, &claims.sub).await?;
    let assignment = services
        .authoring
        .remove_question(&class_id, &assignment_id, &question_id)
        .await?;
    Ok(Json(assignment))
}

/// Attempts with progress, per assignment.
pub async fn attempt_counts(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_staff(&class_id, &claims.sub).await?;
    let counts = services.quiz.attempt_counts(&class_id).await?;
    Ok(Json(counts))
}

/// Attempts of an assignment joined with member records and profiles.
pub async fn list_attempts(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_staff(&class_id, &claims.sub).await?;
    let rows = services.quiz.attempts_with_members(&class_id, &assignment_id).await?;
    Ok(Json(rows))
}
