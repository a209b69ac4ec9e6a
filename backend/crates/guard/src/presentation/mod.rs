//! Presentation Layer
//!
//! axum middleware, HTTP handlers and DTOs.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;
