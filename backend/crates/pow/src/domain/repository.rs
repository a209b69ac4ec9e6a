//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in `infra/`.

use crate::domain::entities::PowChallenge;
use crate::error::PowResult;

/// Challenge repository trait
#[trait_variant::make(ChallengeRepository: Send)]
pub trait LocalChallengeRepository {
    /// Store a freshly issued challenge
    async fn create(&self, challenge: &PowChallenge) -> PowResult<()>;

    /// Remove and return a challenge in one step, expired or not
    ///
    /// Exactly one caller observes `Some` for a given id.
    async fn consume(&self, challenge_id: &str) -> PowResult<Option<PowChallenge>>;
}

/// Work token repository trait
#[trait_variant::make(WorkTokenRepository: Send)]
pub trait LocalWorkTokenRepository {
    /// Remember an issued token by digest
    async fn create(&self, token_digest: &str, expires_at_ms: i64) -> PowResult<()>;

    /// Whether a token with this digest exists and expires after `now_ms`
    async fn is_valid(&self, token_digest: &str, now_ms: i64) -> PowResult<bool>;
}

/// Expiry sweep over challenges and work tokens
#[trait_variant::make(ExpiredPowRepository: Send)]
pub trait LocalExpiredPowRepository {
    /// Delete everything expired, returning `(challenges, work_tokens)` removed
    async fn cleanup_expired(&self) -> PowResult<(u64, u64)>;
}
