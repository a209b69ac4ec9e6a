//! In-memory Repository Implementations
//!
//! Used when no database is configured and in tests. State is per process.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use crate::domain::entities::PowChallenge;
use crate::domain::repository::{ChallengeRepository, ExpiredPowRepository, WorkTokenRepository};
use crate::error::PowResult;

#[derive(Clone, Default)]
pub struct MemoryPowRepository {
    challenges: Arc<DashMap<String, PowChallenge>>,
    /// Token digest -> expiry
    tokens: Arc<DashMap<String, i64>>,
}

impl MemoryPowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored `(challenges, work_tokens)`
    pub fn stored(&self) -> (usize, usize) {
        (self.challenges.len(), self.tokens.len())
    }
}

impl ExpiredPowRepository for MemoryPowRepository {
    async fn cleanup_expired(&self) -> PowResult<(u64, u64)> {
        let now_ms = Utc::now().timestamp_millis();

        let challenges_before = self.challenges.len();
        self.challenges.retain(|_, c| !c.is_expired_at(now_ms));
        let tokens_before = self.tokens.len();
        self.tokens.retain(|_, expires_at_ms| *expires_at_ms > now_ms);

        Ok((
            challenges_before.saturating_sub(self.challenges.len()) as u64,
            tokens_before.saturating_sub(self.tokens.len()) as u64,
        ))
    }
}

impl ChallengeRepository for MemoryPowRepository {
    async fn create(&self, challenge: &PowChallenge) -> PowResult<()> {
        self.challenges
            .insert(challenge.challenge_id.clone(), challenge.clone());
        Ok(())
    }

    async fn consume(&self, challenge_id: &str) -> PowResult<Option<PowChallenge>> {
        Ok(self.challenges.remove(challenge_id).map(|(_, c)| c))
    }
}

impl WorkTokenRepository for MemoryPowRepository {
    async fn create(&self, token_digest: &str, expires_at_ms: i64) -> PowResult<()> {
        self.tokens.insert(token_digest.to_string(), expires_at_ms);
        Ok(())
    }

    async fn is_valid(&self, token_digest: &str, now_ms: i64) -> PowResult<bool> {
        Ok(self
            .tokens
            .get(token_digest)
            .is_some_and(|expires_at_ms| *expires_at_ms > now_ms))
    }
}
