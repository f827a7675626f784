// src/models/class.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::UserProfile;

/// Role of a user inside one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Ta,
}

impl Role {
    /// Counter on the class document this role is aggregated into.
    pub fn counter_field(self) -> &'static str {
        match self {
            Role::Student => "counts.students",
            Role::Instructor | Role::Ta => "counts.instructors",
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Instructor | Role::Ta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassStatus {
    Active,
    Archived,
}

/// Denormalized aggregates. Written only by the membership engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub students: i64,
    pub instructors: i64,
}

/// Represents a `classes/{id}` document: a running instance of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSection {
    pub id: String,
    pub course_id: String,

    /// Course version snapshotted when the class was created.
    pub content_version: i64,
    pub instructor_id: String,
    pub title: String,
    pub status: ClassStatus,

    #[serde(default)]
    pub counts: ClassCounts,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Represents a `classes/{id}/members/{uid}` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMember {
    #[serde(default)]
    pub uid: String,
    pub role: Role,
    pub status: MemberStatus,

    /// Set once on first enrollment, preserved across role changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
}

impl ClassMember {
    /// Counter this record currently contributes to, if any.
    pub fn counted_in(&self) -> Option<&'static str> {
        (self.status == MemberStatus::Active).then(|| self.role.counter_field())
    }
}

/// Represents a `users/{uid}/classIndex/{classId}` mirror row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClassIndex {
    pub class_id: String,
    pub role: Role,
    pub status: MemberStatus,

    /// Class title snapshot at the time of the last membership write.
    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A class joined with the caller's role in it.
#[derive(Debug, Clone, Serialize)]
pub struct ClassWithRole {
    #[serde(flatten)]
    pub class: ClassSection,
    pub role: Role,
}

/// A member joined with its user profile (if the profile still exists).
#[derive(Debug, Clone, Serialize)]
pub struct MemberWithUser {
    #[serde(flatten)]
    pub member: ClassMember,
    pub user: Option<UserProfile>,
}

/// DTO for creating a class.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 100))]
    pub course_id: String,
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
}

/// DTO for adding a known user (or changing their role).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
    pub role: Role,
}
