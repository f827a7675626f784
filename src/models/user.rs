// src/models/user.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Represents a `users/{uid}` profile document.
/// Accounts themselves live with the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub email: String,

    /// Canonical lookup key. Legacy profiles may lack it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_lower: Option<String>,

    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Canonical form of an email used as a lookup key.
pub fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// DTO for registering or refreshing the caller's profile.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProfileRequest {
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
}
