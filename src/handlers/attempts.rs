// src/handlers/attempts.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::attempt::SaveAnswerRequest,
    services::Services,
    utils::jwt::Claims,
};

/// Start the caller's attempt. Safe to call on every page load.
pub async fn start_attempt(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_member(&class_id, &claims.sub).await?;
    services
        .quiz
        .start_attempt_if_needed(&class_id, &assignment_id, &claims.sub)
        .await?;
    let view = services.quiz.attempt_view(&class_id, &assignment_id, &claims.sub).await?;
    Ok(Json(view))
}

/// The caller's attempt with the questions it drew.
pub async fn get_attempt(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_member(&class_id, &claims.sub).await?;
    let view = services.quiz.attempt_view(&class_id, &assignment_id, &claims.sub).await?;
    Ok(Json(view))
}

/// Save one answer slot. Multi-choice saves toggle the given choice.
pub async fn save_answer(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id, index)): Path<(String, String, usize)>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_member(&class_id, &claims.sub).await?;

    let quiz = &services.quiz;
    let uid = claims.sub.as_str();
    let attempt = match payload {
        SaveAnswerRequest::Single { choice } => {
            quiz.save_answer_single(&class_id, &assignment_id, uid, index, choice).await?
        }
        SaveAnswerRequest::Multi { choice } => {
            quiz.toggle_answer_multi(&class_id, &assignment_id, uid, index, choice).await?
        }
        SaveAnswerRequest::Text { text } => {
            if text.len() > 5000 {
                return Err(AppError::BadRequest("Answer is too long".to_string()));
            }
            quiz.save_answer_text(&class_id, &assignment_id, uid, index, &text).await?
        }
    };
    Ok(Json(attempt))
}

/// Submit the caller's attempt for grading.
pub async fn submit_attempt(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, assignment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_member(&class_id, &claims.sub).await?;
    let attempt = services
        .quiz
        .submit_and_grade(&class_id, &assignment_id, &claims.sub)
        .await?;
    Ok(Json(attempt))
}
