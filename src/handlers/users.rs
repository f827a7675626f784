// src/handlers/users.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use validator::Validate;

use crate::{
    error::AppError,
    models::user::RegisterProfileRequest,
    services::Services,
    utils::jwt::Claims,
};

/// Registers or refreshes the caller's profile.
/// Pending invites addressed to the token's email become memberships.
pub async fn register_profile(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RegisterProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let registration = services
        .users
        .register_profile(
            &claims.sub,
            &claims.email,
            payload.first_name.as_deref(),
            payload.last_name.as_deref(),
        )
        .await?;

    Ok(Json(registration))
}

/// Classes the caller belongs to, with their role in each.
pub async fn my_classes(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let classes = services.classes.classes_as_member(&claims.sub).await?;
    Ok(Json(classes))
}

/// Classes the caller owns as instructor.
pub async fn my_teaching(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let classes = services.classes.classes_as_instructor(&claims.sub).await?;
    Ok(Json(classes))
}

/// Drops the caller's index rows that no longer have an active membership.
pub async fn reconcile_class_index(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let removed = services.membership.reconcile_class_index(&claims.sub).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
