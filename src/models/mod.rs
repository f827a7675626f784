// src/models/mod.rs

pub mod assignment;
pub mod attempt;
pub mod class;
pub mod invite;
pub mod paths;
pub mod question;
pub mod user;
