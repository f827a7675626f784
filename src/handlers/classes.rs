// src/handlers/classes.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::class::CreateClassRequest,
    services::Services,
    utils::jwt::Claims,
};

/// Create a class. The caller becomes its instructor.
pub async fn create_class(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let class = services
        .membership
        .create_class(&payload.course_id, &payload.title, &claims.sub)
        .await?;

    Ok((StatusCode::CREATED, Json(class)))
}

/// Get a class the caller is a member of.
pub async fn get_class(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_member(&class_id, &claims.sub).await?;
    let class = services.classes.class(&class_id).await?;
    Ok(Json(class))
}

/// Delete a class with its members, invites and assignments.
pub async fn delete_class(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_staff(&class_id, &claims.sub).await?;
    services.membership.delete_class(&class_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
