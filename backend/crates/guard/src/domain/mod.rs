//! Domain Layer
//!
//! - Feature flags and their environment defaults
//! - Security events and audit entries
//! - The risk policy table and per-request results
//! - Collaborator traits (risk scoring, CAPTCHA verification)
//! - Repository traits

pub mod collaborators;
pub mod decision;
pub mod events;
pub mod flags;
pub mod repository;
