// src/services/users.rs

use serde_json::{Map, Value};

use crate::{
    error::AppError,
    models::{
        paths,
        user::{UserProfile, canonical_email},
    },
    store::TxRunner,
};

use super::invites::InviteResolver;

#[derive(Clone)]
pub struct UserDirectory {
    runner: TxRunner,
    invites: InviteResolver,
}

/// Result of a profile registration.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub profile: UserProfile,
    /// Classes joined through pending invites.
    pub joined_classes: Vec<String>,
}

impl UserDirectory {
    pub fn new(runner: TxRunner, invites: InviteResolver) -> Self {
        Self { runner, invites }
    }

    /// Creates or refreshes `users/{uid}` for an authenticated account, then
    /// applies pending invites addressed to its email.
    pub async fn register_profile(
        &self,
        uid: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Registration, AppError> {
        paths::validate_id("uid", uid)?;
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::BadRequest("Email is required".to_string()));
        }

        let path = &paths::user(uid);
        let mut fields = Map::new();
        fields.insert("uid".into(), Value::from(uid));
        fields.insert("email".into(), Value::from(email));
        fields.insert("emailLower".into(), Value::from(canonical_email(email)));
        if let Some(first) = first_name {
            fields.insert("firstName".into(), Value::from(first.trim()));
        }
        if let Some(last) = last_name {
            fields.insert("lastName".into(), Value::from(last.trim()));
        }
        let fields = &Value::Object(fields);

        let existed = self
            .runner
            .run::<_, AppError, _, _>(|tx| async move {
                let exists = tx.get(path).await?.is_some();
                tx.set_merge(path, fields, Vec::new())?;
                Ok(exists)
            })
            .await?;
        if !existed {
            tracing::info!(uid, "profile created");
        }

        let joined_classes = self.invites.accept_pending_invites(uid, email).await?;
        let profile = self
            .profile(uid)
            .await?
            .ok_or_else(|| AppError::InternalServerError(format!("Profile {uid} vanished after write")))?;

        Ok(Registration {
            profile,
            joined_classes,
        })
    }

    pub async fn profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        paths::validate_id("uid", uid)?;
        match self.runner.store().get(&paths::user(uid)).await? {
            Some(doc) => {
                let mut user: UserProfile = doc.parse()?;
                user.uid = doc.id().to_string();
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }
}
