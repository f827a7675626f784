// src/models/invite.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::class::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Canceled,
}

/// Represents a `classes/{id}/invites/{inviteId}` document: an invitation
/// waiting for the email to register an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInvite {
    /// Document id, filled in on read; never stored in the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Lowercased canonical email.
    pub email: String,
    pub role: Role,
    pub status: InviteStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub invited_by: String,
}

fn default_role() -> Role {
    Role::Student
}

/// DTO for inviting by email.
#[derive(Debug, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

/// Outcome of an invite: the resolved member, or a pending invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteOutcome {
    pub uid: Option<String>,
    pub pending: bool,
}
