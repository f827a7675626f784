// src/handlers/mod.rs

pub mod assignments;
pub mod attempts;
pub mod classes;
pub mod invites;
pub mod members;
pub mod users;
