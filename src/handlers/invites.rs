// src/handlers/invites.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        invite::{InviteOutcome, InviteRequest},
        user::canonical_email,
    },
    services::Services,
    utils::jwt::Claims,
};

/// Pending invites of a class.
pub async fn list_invites(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_staff(&class_id, &claims.sub).await?;
    let invites = services.invites.pending_invites(&class_id).await?;
    Ok(Json(invites))
}

/// Invite by email: adds the account if it exists, otherwise records a pending invite.
pub async fn create_invite(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<String>,
    Json(payload): Json<InviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if canonical_email(&payload.email) == canonical_email(&claims.email) {
        return Err(AppError::BadRequest("You cannot invite yourself".to_string()));
    }
    services.classes.require_staff(&class_id, &claims.sub).await?;

    let uid = services
        .invites
        .invite_by_email_or_create_pending(&class_id, &payload.email, payload.role, &claims.sub)
        .await?;

    let status = if uid.is_some() { StatusCode::OK } else { StatusCode::ACCEPTED };
    let pending = uid.is_none();
    Ok((status, Json(InviteOutcome { uid, pending })))
}

/// Cancel a pending invite. Succeeds when it is already gone.
pub async fn cancel_invite(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((class_id, invite_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    services.classes.require_staff(&class_id, &claims.sub).await?;
    services.invites.cancel_invite(&class_id, &invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
