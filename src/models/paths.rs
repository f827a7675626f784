// src/models/paths.rs

//! Document layout of the platform.
//!
//! ```text
//! users/{uid}
//! users/{uid}/classIndex/{classId}
//! courses/{courseId}
//! classes/{classId}
//! classes/{classId}/members/{uid}
//! classes/{classId}/invites/{inviteId}
//! classes/{classId}/assignments/{assignmentId}
//! classes/{classId}/assignments/{assignmentId}/attempts/{uid}
//! ```

use crate::{
    error::AppError,
    store::{CollectionPath, DocPath},
};

pub const MEMBERS: &str = "members";
pub const INVITES: &str = "invites";
pub const ASSIGNMENTS: &str = "assignments";
pub const ATTEMPTS: &str = "attempts";
pub const CLASS_INDEX: &str = "classIndex";

/// Rejects ids that would not address a single path segment.
pub fn validate_id(label: &str, id: &str) -> Result<(), AppError> {
    if id.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{label} is required")));
    }
    if id.contains('/') {
        return Err(AppError::BadRequest(format!("{label} must not contain '/'")));
    }
    Ok(())
}

pub fn users() -> CollectionPath {
    CollectionPath::root("users")
}

pub fn user(uid: &str) -> DocPath {
    users().doc(uid)
}

pub fn class_index(uid: &str) -> CollectionPath {
    user(uid).collection(CLASS_INDEX)
}

pub fn class_index_entry(uid: &str, class_id: &str) -> DocPath {
    class_index(uid).doc(class_id)
}

pub fn course(course_id: &str) -> DocPath {
    CollectionPath::root("courses").doc(course_id)
}

pub fn classes() -> CollectionPath {
    CollectionPath::root("classes")
}

pub fn class(class_id: &str) -> DocPath {
    classes().doc(class_id)
}

pub fn members(class_id: &str) -> CollectionPath {
    class(class_id).collection(MEMBERS)
}

pub fn member(class_id: &str, uid: &str) -> DocPath {
    members(class_id).doc(uid)
}

pub fn invites(class_id: &str) -> CollectionPath {
    class(class_id).collection(INVITES)
}

pub fn invite(class_id: &str, invite_id: &str) -> DocPath {
    invites(class_id).doc(invite_id)
}

pub fn assignments(class_id: &str) -> CollectionPath {
    class(class_id).collection(ASSIGNMENTS)
}

pub fn assignment(class_id: &str, assignment_id: &str) -> DocPath {
    assignments(class_id).doc(assignment_id)
}

pub fn attempts(class_id: &str, assignment_id: &str) -> CollectionPath {
    assignment(class_id, assignment_id).collection(ATTEMPTS)
}

pub fn attempt(class_id: &str, assignment_id: &str, uid: &str) -> DocPath {
    attempts(class_id, assignment_id).doc(uid)
}

/// Class id owning an invite document found by a collection-group query.
pub fn class_id_of_invite(invite: &DocPath) -> Option<String> {
    invite
        .parent()
        .parent_doc()
        .map(|class| class.id().to_string())
}
