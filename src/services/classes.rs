// src/services/classes.rs

//! Read-only views over classes and memberships.

use std::sync::Arc;

use crate::{
    error::AppError,
    models::{
        class::{ClassMember, ClassSection, ClassWithRole, MemberStatus, MemberWithUser, UserClassIndex},
        paths,
        user::UserProfile,
    },
    store::{Direction, Document, DocumentStore, Query},
};

#[derive(Clone)]
pub struct ClassDirectory {
    store: Arc<dyn DocumentStore>,
}

fn member_from(doc: &Document) -> Result<ClassMember, AppError> {
    let mut member: ClassMember = doc.parse()?;
    member.uid = doc.id().to_string();
    Ok(member)
}

impl ClassDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn class(&self, class_id: &str) -> Result<ClassSection, AppError> {
        paths::validate_id("classId", class_id)?;
        match self.store.get(&paths::class(class_id)).await? {
            Some(doc) => Ok(doc.parse()?),
            None => Err(AppError::NotFound(format!("Class {class_id} not found"))),
        }
    }

    pub async fn member(&self, class_id: &str, uid: &str) -> Result<Option<ClassMember>, AppError> {
        match self.store.get(&paths::member(class_id, uid)).await? {
            Some(doc) => Ok(Some(member_from(&doc)?)),
            None => Ok(None),
        }
    }

    /// Active membership of `uid`, or `Forbidden`.
    pub async fn require_member(&self, class_id: &str, uid: &str) -> Result<ClassMember, AppError> {
        paths::validate_id("classId", class_id)?;
        match self.member(class_id, uid).await? {
            Some(member) if member.status == MemberStatus::Active => Ok(member),
            _ => Err(AppError::Forbidden("You are not a member of this class".to_string())),
        }
    }

    /// Active instructor or TA membership of `uid`, or `Forbidden`.
    pub async fn require_staff(&self, class_id: &str, uid: &str) -> Result<ClassMember, AppError> {
        let member = self.require_member(class_id, uid).await?;
        if !member.role.is_staff() {
            return Err(AppError::Forbidden("Only instructors and TAs can do this".to_string()));
        }
        Ok(member)
    }

    /// Members of a class ordered by role.
    pub async fn members(&self, class_id: &str) -> Result<Vec<ClassMember>, AppError> {
        paths::validate_id("classId", class_id)?;
        let docs = self
            .store
            .query(&Query::collection(paths::members(class_id)).order_by("role", Direction::Ascending))
            .await?;
        docs.iter().map(member_from).collect()
    }

    pub async fn profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        match self.store.get(&paths::user(uid)).await? {
            Some(doc) => {
                let mut user: UserProfile = doc.parse()?;
                user.uid = doc.id().to_string();
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Members joined with their profiles. Members without a profile keep `user: None`.
    pub async fn members_with_users(&self, class_id: &str) -> Result<Vec<MemberWithUser>, AppError> {
        let members = self.members(class_id).await?;
        let mut rows = Vec::with_capacity(members.len());
        for member in members {
            let user = self.profile(&member.uid).await?;
            rows.push(MemberWithUser { member, user });
        }
        Ok(rows)
    }

    /// Classes owned by `uid`, newest first.
    pub async fn classes_as_instructor(&self, uid: &str) -> Result<Vec<ClassSection>, AppError> {
        let docs = self
            .store
            .query(
                &Query::collection(paths::classes())
                    .where_eq("instructorId", uid)
                    .order_by("createdAt", Direction::Descending),
            )
            .await?;
        Ok(docs.iter().map(Document::parse).collect::<Result<_, _>>()?)
    }

    /// Mirror index rows of `uid`, most recently touched first.
    pub async fn user_class_index(&self, uid: &str) -> Result<Vec<UserClassIndex>, AppError> {
        paths::validate_id("uid", uid)?;
        let docs = self
            .store
            .query(&Query::collection(paths::class_index(uid)).order_by("updatedAt", Direction::Descending))
            .await?;
        Ok(docs.iter().map(Document::parse).collect::<Result<_, _>>()?)
    }

    /// Classes `uid` belongs to, with their role. Index rows whose class is gone are skipped.
    pub async fn classes_as_member(&self, uid: &str) -> Result<Vec<ClassWithRole>, AppError> {
        let index = self.user_class_index(uid).await?;
        let mut classes = Vec::with_capacity(index.len());
        for row in index {
            match self.store.get(&paths::class(&row.class_id)).await? {
                Some(doc) => classes.push(ClassWithRole {
                    class: doc.parse()?,
                    role: row.role,
                }),
                None => tracing::debug!(uid, class_id = %row.class_id, "index row without class"),
            }
        }
        Ok(classes)
    }
}
