//! Application Layer - Services
//!
//! Orchestrates domain logic and infrastructure.

pub mod config;
pub mod feature_flags;
pub mod maintenance;
pub mod rate_limiter;
pub mod security_check;
pub mod telemetry;
