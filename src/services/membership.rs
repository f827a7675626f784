// src/services/membership.rs

//! Sole writer of `counts.*` on class documents and of `users/{uid}/classIndex`.
//!
//! Every mutation that touches a membership record adjusts the counters and
//! the mirror index in the same commit, so readers of any one of the three
//! never see a state the others contradict.

use serde_json::json;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        class::{ClassCounts, ClassMember, ClassSection, ClassStatus, MemberStatus, Role, UserClassIndex},
        paths,
    },
    store::{FieldTransform, Query, TxRunner, WriteBatch},
};

use super::cascade;

#[derive(Clone)]
pub struct MembershipEngine {
    runner: TxRunner,
}

impl MembershipEngine {
    pub fn new(runner: TxRunner) -> Self {
        Self { runner }
    }

    /// Adds `uid` to the class or changes their role, returning the role
    /// actually stored. An existing instructor is never demoted.
    pub async fn add_or_update_member(
        &self,
        class_id: &str,
        uid: &str,
        requested: Role,
    ) -> Result<Role, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("uid", uid)?;

        let class_path = &paths::class(class_id);
        let member_path = &paths::member(class_id, uid);
        let index_path = &paths::class_index_entry(uid, class_id);

        let (effective, previous) = self
            .runner
            .run::<_, AppError, _, _>(|tx| async move {
                let class: ClassSection = tx
                    .get_as(class_path)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Class {class_id} not found")))?;
                let existing: Option<ClassMember> = tx.get_as(member_path).await?;

                let effective = match &existing {
                    Some(member) if member.role == Role::Instructor => Role::Instructor,
                    _ => requested,
                };

                let before = existing.as_ref().and_then(ClassMember::counted_in);
                let after = effective.counter_field();
                let mut counters = Vec::new();
                if before != Some(after) {
                    if let Some(old) = before {
                        counters.push(FieldTransform::increment(old, -1));
                    }
                    counters.push(FieldTransform::increment(after, 1));
                }

                let mut member_transforms = vec![FieldTransform::server_timestamp("updatedAt")];
                if existing.as_ref().and_then(|m| m.enrolled_at).is_none() {
                    member_transforms.push(FieldTransform::server_timestamp("enrolledAt"));
                }
                tx.set_merge(
                    member_path,
                    &json!({ "uid": uid, "role": effective, "status": MemberStatus::Active }),
                    member_transforms,
                )?;

                if !counters.is_empty() {
                    counters.push(FieldTransform::server_timestamp("updatedAt"));
                    tx.update(class_path, counters)?;
                }

                let index = UserClassIndex {
                    class_id: class_id.to_string(),
                    role: effective,
                    status: MemberStatus::Active,
                    title: class.title,
                    updated_at: None,
                };
                tx.set_merge(index_path, &index, vec![FieldTransform::server_timestamp("updatedAt")])?;

                Ok((effective, existing.map(|m| m.role)))
            })
            .await?;

        if previous != Some(effective) {
            tracing::info!(class_id, uid, ?previous, role = ?effective, "membership updated");
        }
        Ok(effective)
    }

    /// Removes `uid` from the class. Returns false when there was nothing to remove.
    pub async fn remove_member(&self, class_id: &str, uid: &str) -> Result<bool, AppError> {
        paths::validate_id("classId", class_id)?;
        paths::validate_id("uid", uid)?;

        let class_path = &paths::class(class_id);
        let member_path = &paths::member(class_id, uid);
        let index_path = &paths::class_index_entry(uid, class_id);

        let removed = self
            .runner
            .run::<_, AppError, _, _>(|tx| async move {
                let class_exists = tx.get(class_path).await?.is_some();
                let Some(member) = tx.get_as::<ClassMember>(member_path).await? else {
                    return Ok(None);
                };

                tx.delete(member_path)?;
                tx.delete(index_path)?;
                if let (true, Some(counter)) = (class_exists, member.counted_in()) {
                    tx.update(
                        class_path,
                        vec![
                            FieldTransform::increment(counter, -1),
                            FieldTransform::server_timestamp("updatedAt"),
                        ],
                    )?;
                }
                Ok(Some(member.role))
            })
            .await?;

        match removed {
            Some(role) => {
                tracing::info!(class_id, uid, ?role, "member removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Creates a class owned by `instructor_id`, who becomes its first member.
    pub async fn create_class(
        &self,
        course_id: &str,
        title: &str,
        instructor_id: &str,
    ) -> Result<ClassSection, AppError> {
        paths::validate_id("courseId", course_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::BadRequest("Title is required".to_string()));
        }

        let store = self.runner.store();
        let content_version = store
            .get(&paths::course(course_id))
            .await?
            .and_then(|course| course.data.get("contentVersion").and_then(|v| v.as_i64()))
            .filter(|version| *version > 0)
            .unwrap_or(1);

        let class_id = Uuid::new_v4().to_string();
        let class = ClassSection {
            id: class_id.clone(),
            course_id: course_id.to_string(),
            content_version,
            instructor_id: instructor_id.to_string(),
            title: title.to_string(),
            status: ClassStatus::Active,
            counts: ClassCounts {
                students: 0,
                instructors: 1,
            },
            created_at: None,
            updated_at: None,
        };
        let member = ClassMember {
            uid: instructor_id.to_string(),
            role: Role::Instructor,
            status: MemberStatus::Active,
            enrolled_at: None,
        };
        let index = UserClassIndex {
            class_id: class_id.clone(),
            role: Role::Instructor,
            status: MemberStatus::Active,
            title: title.to_string(),
            updated_at: None,
        };

        let class_path = paths::class(&class_id);
        let mut batch = WriteBatch::new(store.clone());
        batch.set(
            &class_path,
            &class,
            vec![
                FieldTransform::server_timestamp("createdAt"),
                FieldTransform::server_timestamp("updatedAt"),
            ],
        )?;
        batch.set(
            &paths::member(&class_id, instructor_id),
            &member,
            vec![FieldTransform::server_timestamp("enrolledAt")],
        )?;
        batch.set(
            &paths::class_index_entry(instructor_id, &class_id),
            &index,
            vec![FieldTransform::server_timestamp("updatedAt")],
        )?;
        batch.commit().await?;

        tracing::info!(%class_id, course_id, instructor_id, "class created");

        match store.get(&class_path).await? {
            Some(doc) => Ok(doc.parse()?),
            None => Err(AppError::InternalServerError(format!("Class {class_id} vanished after create"))),
        }
    }

    /// Cascade-deletes a class. See [`cascade::delete_class_tree`].
    pub async fn delete_class(&self, class_id: &str) -> Result<usize, AppError> {
        paths::validate_id("classId", class_id)?;
        let deleted = cascade::delete_class_tree(self.runner.store(), class_id).await?;
        tracing::info!(class_id, deleted, "class deleted");
        Ok(deleted)
    }

    /// Deletes index rows of `uid` whose membership is missing or inactive.
    /// Repairs what an interrupted cascade leaves behind.
    pub async fn reconcile_class_index(&self, uid: &str) -> Result<usize, AppError> {
        paths::validate_id("uid", uid)?;

        let rows = self
            .runner
            .store()
            .query(&Query::collection(paths::class_index(uid)))
            .await?;

        let mut removed = 0;
        for row in rows {
            let index_path = &row.path;
            let member_path = &paths::member(row.id(), uid);

            let stale = self
                .runner
                .run::<_, AppError, _, _>(|tx| async move {
                    if tx.get(index_path).await?.is_none() {
                        return Ok(false);
                    }
                    let member: Option<ClassMember> = tx.get_as(member_path).await?;
                    let active = member.is_some_and(|m| m.status == MemberStatus::Active);
                    if !active {
                        tx.delete(index_path)?;
                    }
                    Ok(!active)
                })
                .await?;

            if stale {
                tracing::warn!(uid, class_id = row.id(), "removed orphaned class index row");
                removed += 1;
            }
        }
        Ok(removed)
    }
}
