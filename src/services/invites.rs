// src/services/invites.rs

use serde_json::json;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        class::Role,
        invite::{InviteStatus, PendingInvite},
        paths,
        user::{UserProfile, canonical_email},
    },
    store::{Direction, Document, FieldTransform, Query, TxRunner, WriteBatch},
};

use super::membership::MembershipEngine;

/// Decides per email between a membership write and a pending invite,
/// and turns pending invites into memberships once the email registers.
#[derive(Clone)]
pub struct InviteResolver {
    runner: TxRunner,
    membership: MembershipEngine,
}

/// Stable invite id for an email, so concurrent first invites land on one document.
pub fn invite_id_for(email: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("invite:{}", canonical_email(email)).as_bytes()).to_string()
}

fn invite_from(doc: &Document) -> Result<PendingInvite, AppError> {
    let mut invite: PendingInvite = doc.parse()?;
    invite.id = Some(doc.id().to_string());
    Ok(invite)
}

impl InviteResolver {
    pub fn new(runner: TxRunner, membership: MembershipEngine) -> Self {
        Self { runner, membership }
    }

    /// Looks a user up by canonical email, falling back to an exact-case
    /// match on `email` for profiles written before `emailLower` existed.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserProfile>, AppError> {
        let store = self.runner.store();
        let canonical = canonical_email(email);

        let mut found = store
            .query(&Query::collection(paths::users()).where_eq("emailLower", canonical.as_str()).limit(1))
            .await?;
        if found.is_empty() {
            found = store
                .query(&Query::collection(paths::users()).where_eq("email", email.trim()).limit(1))
                .await?;
        }

        match found.first() {
            Some(doc) => {
                let mut user: UserProfile = doc.parse()?;
                user.uid = doc.id().to_string();
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn invites_for_email(&self, class_id: &str, canonical: &str) -> Result<Vec<PendingInvite>, AppError> {
        let docs = self
            .runner
            .store()
            .query(&Query::collection(paths::invites(class_id)).where_eq("email", canonical))
            .await?;
        docs.iter().map(invite_from).collect()
    }

    /// Resolves `email` to a member if the account exists, otherwise records
    /// a pending invite. Returns the member uid, or `None` when pending.
    pub async fn invite_by_email_or_create_pending(
        &self,
        class_id: &str,
        email: &str,
        role: Role,
        invited_by: &str,
    ) -> Result<Option<String>, AppError> {
        paths::validate_id("classId", class_id)?;
        let canonical = canonical_email(email);
        if canonical.is_empty() {
            return Err(AppError::BadRequest("Email is required".to_string()));
        }

        if let Some(user) = self.find_user_by_email(email).await? {
            self.membership.add_or_update_member(class_id, &user.uid, role).await?;

            let stale = self.invites_for_email(class_id, &canonical).await?;
            if !stale.is_empty() {
                let mut batch = WriteBatch::new(self.runner.store().clone());
                for invite in stale.iter().filter_map(|i| i.id.as_deref()) {
                    batch.delete(&paths::invite(class_id, invite));
                }
                batch.commit().await?;
            }
            return Ok(Some(user.uid));
        }

        let existing_id = self
            .invites_for_email(class_id, &canonical)
            .await?
            .into_iter()
            .find(|i| i.status != InviteStatus::Canceled)
            .and_then(|i| i.id);
        let invite_id = existing_id.unwrap_or_else(|| invite_id_for(&canonical));

        let class_path = &paths::class(class_id);
        let invite_path = &paths::invite(class_id, &invite_id);
        let canonical = canonical.as_str();

        self.runner
            .run::<_, AppError, _, _>(|tx| async move {
                if tx.get(class_path).await?.is_none() {
                    return Err(AppError::NotFound(format!("Class {class_id} not found")));
                }
                let is_new = tx.get(invite_path).await?.is_none();

                let mut transforms = Vec::new();
                if is_new {
                    transforms.push(FieldTransform::server_timestamp("createdAt"));
                }
                tx.set_merge(
                    invite_path,
                    &json!({
                        "email": canonical,
                        "role": role,
                        "status": InviteStatus::Pending,
                        "invitedBy": invited_by,
                    }),
                    transforms,
                )?;
                tx.update(class_path, vec![FieldTransform::server_timestamp("updatedAt")])?;
                Ok(())
            })
            .await?;

        tracing::info!(class_id, %invite_id, ?role, "pending invite recorded");
        Ok(None)
    }

    /// Deletes an invite. Deleting a missing invite succeeds.
    pub async fn cancel_invite(&self, class_id: &str, invite_id: &str) -> Result<(), AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("inviteId", invite_id)?;

        let mut batch = WriteBatch::new(self.runner.store().clone());
        batch.delete(&paths::invite(class_id, invite_id));
        batch.commit().await?;
        Ok(())
    }

    /// Applies every pending invite addressed to `email` for the newly
    /// registered `uid`. Returns the joined class ids.
    pub async fn accept_pending_invites(&self, uid: &str, email: &str) -> Result<Vec<String>, AppError> {
        let canonical = canonical_email(email);
        if canonical.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self
            .runner
            .store()
            .query(
                &Query::group(paths::INVITES)
                    .where_eq("email", canonical.as_str())
                    .where_eq("status", "pending"),
            )
            .await?;

        let mut joined = Vec::new();
        for doc in docs {
            let Some(class_id) = paths::class_id_of_invite(&doc.path) else {
                continue;
            };
            let invite = invite_from(&doc)?;

            match self.membership.add_or_update_member(&class_id, uid, invite.role).await {
                Ok(_) => joined.push(class_id),
                Err(AppError::NotFound(_)) => {
                    tracing::warn!(%class_id, invite = doc.id(), "dropping invite for deleted class");
                }
                Err(e) => return Err(e),
            }

            let mut batch = WriteBatch::new(self.runner.store().clone());
            batch.delete(&doc.path);
            batch.commit().await?;
        }

        if !joined.is_empty() {
            tracing::info!(uid, classes = joined.len(), "pending invites accepted");
        }
        Ok(joined)
    }

    /// Pending invites of a class, newest first.
    pub async fn pending_invites(&self, class_id: &str) -> Result<Vec<PendingInvite>, AppError> {
        paths::validate_id("classId", class_id)?;
        let docs = self
            .runner
            .store()
            .query(
                &Query::collection(paths::invites(class_id))
                    .where_eq("status", "pending")
                    .order_by("createdAt", Direction::Descending),
            )
            .await?;
        docs.iter().map(invite_from).collect()
    }
}
