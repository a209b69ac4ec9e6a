//! PostgreSQL Repository Implementations

use chrono::Utc;
use sqlx::PgPool;

use crate::domain::entities::PowChallenge;
use crate::domain::repository::{ChallengeRepository, ExpiredPowRepository, WorkTokenRepository};
use crate::domain::value_objects::Difficulty;
use crate::error::{PowError, PowResult};

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgPowRepository {
    pool: PgPool,
}

impl PgPowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ExpiredPowRepository for PgPowRepository {
    async fn cleanup_expired(&self) -> PowResult<(u64, u64)> {
        let now_ms = Utc::now().timestamp_millis();

        let challenges_deleted = sqlx::query("DELETE FROM pow_challenges WHERE expires_at_ms < $1")
            .bind(now_ms)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let tokens_deleted = sqlx::query("DELETE FROM pow_work_tokens WHERE expires_at_ms < $1")
            .bind(now_ms)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!(
            challenges = challenges_deleted,
            work_tokens = tokens_deleted,
            "Cleaned up expired PoW data"
        );

        Ok((challenges_deleted, tokens_deleted))
    }
}

impl ChallengeRepository for PgPowRepository {
    async fn create(&self, challenge: &PowChallenge) -> PowResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pow_challenges (
                challenge_id,
                difficulty_bits,
                target_hash,
                expires_at_ms,
                created_at
            ) VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&challenge.challenge_id)
        .bind(challenge.difficulty.bits() as i16)
        .bind(&challenge.target_hash)
        .bind(challenge.expires_at_ms)
        .bind(challenge.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume(&self, challenge_id: &str) -> PowResult<Option<PowChallenge>> {
        // DELETE .. RETURNING hands the row to exactly one concurrent caller
        let row = sqlx::query_as::<_, ChallengeRow>(
            r#"
            DELETE FROM pow_challenges
            WHERE challenge_id = $1
            RETURNING
                challenge_id,
                difficulty_bits,
                target_hash,
                expires_at_ms,
                created_at
            "#,
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                tracing::info!(challenge_id = %challenge_id, "Challenge consumed");
                Ok(Some(r.into_challenge()?))
            }
            None => {
                tracing::warn!(challenge_id = %challenge_id, "Challenge not found");
                Ok(None)
            }
        }
    }
}

impl WorkTokenRepository for PgPowRepository {
    async fn create(&self, token_digest: &str, expires_at_ms: i64) -> PowResult<()> {
        sqlx::query("INSERT INTO pow_work_tokens (token_digest, expires_at_ms) VALUES ($1, $2)")
            .bind(token_digest)
            .bind(expires_at_ms)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn is_valid(&self, token_digest: &str, now_ms: i64) -> PowResult<bool> {
        let valid = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM pow_work_tokens WHERE token_digest = $1 AND expires_at_ms > $2)",
        )
        .bind(token_digest)
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(valid)
    }
}

// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct ChallengeRow {
    challenge_id: String,
    difficulty_bits: i16,
    target_hash: String,
    expires_at_ms: i64,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl ChallengeRow {
    fn into_challenge(self) -> PowResult<PowChallenge> {
        let bits = u8::try_from(self.difficulty_bits)
            .map_err(|_| PowError::Internal(format!("stored difficulty {}", self.difficulty_bits)))?;
        let difficulty = Difficulty::new(bits).ok_or(PowError::InvalidDifficulty(bits))?;

        Ok(PowChallenge {
            challenge_id: self.challenge_id,
            difficulty,
            target_hash: self.target_hash,
            expires_at_ms: self.expires_at_ms,
            created_at: self.created_at,
        })
    }
}
