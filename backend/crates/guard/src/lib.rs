//! Request Gating Module
//!
//! Decides, per inbound request, whether to allow it, demand a CAPTCHA or
//! proof-of-work gate, or block it.
//!
//! Clean Architecture structure:
//! - `domain/` - Feature flags, security events, the policy table, collaborator and repository traits
//! - `application/` - RateLimiter, FeatureFlagsManager, SecurityTelemetry and the SecurityMiddleware orchestrator
//! - `infra/` - PostgreSQL and in-memory stores, the background writer
//! - `presentation/` - axum middleware, PoW challenge endpoints, security admin endpoints
//!
//! ## Failure Model
//! - Store outages degrade: rate limiting falls back to per-process windows, flags to environment defaults
//! - Expired hits, challenges and work tokens are swept periodically by `Maintenance`
//! - Durable writes go through a bounded queue and are dropped (with a log line) when it is full
//! - Any error while evaluating a request fails OPEN: the request is allowed and
//!   `security_middleware_error` is logged. Availability wins over blocking; a
//!   broken scorer therefore lets traffic through until it is fixed.

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

pub use application::config::{GuardConfig, RouteLimit};
pub use application::feature_flags::FeatureFlagsManager;
pub use application::maintenance::Maintenance;
pub use application::rate_limiter::RateLimiter;
pub use application::security_check::{RequestContext, SecurityMiddleware};
pub use application::telemetry::{SecurityMetrics, SecurityTelemetry};
pub use domain::collaborators::{NoCaptchaProvider, StaticRiskScorer};
pub use domain::decision::{GateKind, RiskThresholds, SecurityCheckResult};
pub use domain::flags::{FeatureFlag, FeatureFlagSet};
pub use error::{GuardError, GuardResult};
pub use infra::memory::MemoryGuardRepository;
pub use infra::postgres::PgGuardRepository;
pub use infra::writer::BackgroundWriter;
pub use presentation::router::{challenge_router, security_router};

#[cfg(test)]
mod tests;
