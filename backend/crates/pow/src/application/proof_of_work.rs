//! ProofOfWork service
//!
//! Challenge generation, server-side verification and work-token issuance.
//! Holds no state besides its configuration; persistence is the job of the
//! issue/submit use cases.

use chrono::Utc;
use platform::crypto::{constant_time_eq, random_hex_128};
use std::sync::Arc;
use std::time::Duration;

use crate::application::config::PowConfig;
use crate::domain::entities::{PowChallenge, PowSolution, WorkToken};
use crate::domain::services::{estimated_solve_time, solution_hash};
use crate::domain::value_objects::Difficulty;

#[derive(Debug, Clone)]
pub struct ProofOfWork {
    config: Arc<PowConfig>,
}

impl ProofOfWork {
    pub fn new(config: Arc<PowConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PowConfig {
        &self.config
    }

    pub fn generate_challenge(&self, difficulty: Difficulty) -> PowChallenge {
        let created_at = Utc::now();
        PowChallenge {
            challenge_id: random_hex_128(),
            difficulty,
            target_hash: difficulty.target().prefix(),
            expires_at_ms: created_at.timestamp_millis() + self.config.challenge_ttl_ms(),
            created_at,
        }
    }

    /// Check a solution against the challenge it claims to answer
    ///
    /// Returns `false` for a foreign challenge id, a hash that differs from
    /// the recomputed one (even if it would meet the target), a hash that
    /// misses the target, or an expired challenge.
    pub fn verify_solution(&self, solution: &PowSolution, challenge: &PowChallenge) -> bool {
        self.verify_solution_at(solution, challenge, Utc::now().timestamp_millis())
    }

    pub fn verify_solution_at(
        &self,
        solution: &PowSolution,
        challenge: &PowChallenge,
        now_ms: i64,
    ) -> bool {
        if solution.challenge_id != challenge.challenge_id {
            return false;
        }
        if challenge.is_expired_at(now_ms) {
            return false;
        }

        let expected = solution_hash(&challenge.challenge_id, solution.nonce);
        let provided = solution.hash.to_ascii_lowercase();
        if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
            return false;
        }

        challenge.difficulty.target().is_met_by(&expected)
    }

    pub fn generate_work_token(&self) -> WorkToken {
        let issued_at_ms = Utc::now().timestamp_millis();
        WorkToken {
            token: format!("{}.{}", random_hex_128(), random_hex_128()),
            issued_at_ms,
            expires_at_ms: issued_at_ms + self.config.work_token_ttl_ms(),
        }
    }

    pub fn estimated_solve_time(&self, difficulty: Difficulty) -> Duration {
        estimated_solve_time(difficulty)
    }
}
