//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in `infra/`.

use platform::rate_limit::RateLimitStore;
use pow::domain::repository::{ChallengeRepository, ExpiredPowRepository, WorkTokenRepository};

use crate::domain::events::{AuditEntry, SecurityEvent};
use crate::domain::flags::FeatureFlag;
use crate::error::GuardResult;

/// A stored flag value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRow {
    pub name: String,
    pub enabled: bool,
}

#[trait_variant::make(FeatureFlagRepository: Send)]
pub trait LocalFeatureFlagRepository {
    /// Every stored flag, including names this build does not know
    async fn load_all(&self) -> GuardResult<Vec<FlagRow>>;

    async fn upsert(&self, flag: FeatureFlag, enabled: bool, updated_by: &str) -> GuardResult<()>;

    /// Returns whether a row was inserted
    async fn insert_if_absent(
        &self,
        flag: FeatureFlag,
        enabled: bool,
        description: &str,
    ) -> GuardResult<bool>;
}

#[trait_variant::make(SecurityEventRepository: Send)]
pub trait LocalSecurityEventRepository {
    async fn insert_event(&self, event: &SecurityEvent) -> GuardResult<()>;
}

#[trait_variant::make(AuditLogRepository: Send)]
pub trait LocalAuditLogRepository {
    async fn append(&self, entry: &AuditEntry) -> GuardResult<()>;
}

#[trait_variant::make(RateLimitRetention: Send)]
pub trait LocalRateLimitRetention {
    /// Drop hits older than `max_window_ms`, returning how many entries went
    async fn cleanup_expired(&self, max_window_ms: i64) -> GuardResult<u64>;
}

/// Everything the gate persists, implemented by each backend
pub trait GuardStore:
    RateLimitStore
    + RateLimitRetention
    + FeatureFlagRepository
    + SecurityEventRepository
    + AuditLogRepository
    + Send
    + Sync
    + 'static
{
}

impl<T> GuardStore for T where
    T: RateLimitStore
        + RateLimitRetention
        + FeatureFlagRepository
        + SecurityEventRepository
        + AuditLogRepository
        + Send
        + Sync
        + 'static
{
}

/// Challenge and work-token persistence, as needed by the PoW endpoints and gate
pub trait PowStore:
    ChallengeRepository + WorkTokenRepository + ExpiredPowRepository + Send + Sync + 'static
{
}

impl<T> PowStore for T where
    T: ChallengeRepository + WorkTokenRepository + ExpiredPowRepository + Send + Sync + 'static
{
}
