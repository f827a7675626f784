// src/handlers/members.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::class::AddMemberRequest,
    services::Services,
    utils::jwt::Claims,
};

/// Members of a class joined with their profiles.
pub async fn list_members(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_member(&class_id, &claims.sub).await?;
    let members = services.classes.members_with_users(&class_id).await?;
    Ok(Json(members))
}

/// Add a known user to the class or change their role.
pub async fn add_member(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    services.classes.require_staff(&class_id, &claims.sub).await?;

    let role = services
        .membership
        .add_or_update_member(&class_id, &payload.uid, payload.role)
        .await?;

    Ok(Json(serde_json::json!({ "uid": payload.uid, "role": role })))
}

/// Remove a member. Staff may remove anyone; members may leave.
pub async fn remove_member(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, uid)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    if uid != claims.sub {
        services.classes.require_staff(&class_id, &claims.sub).await?;
    }

    if !services.membership.remove_member(&class_id, &uid).await? {
        return Err(AppError::NotFound("Member not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
