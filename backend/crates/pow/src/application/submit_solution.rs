//! Submit Solution Use Case

use std::sync::Arc;

use crate::application::proof_of_work::ProofOfWork;
use crate::domain::entities::{PowSolution, WorkToken};
use crate::domain::repository::{ChallengeRepository, WorkTokenRepository};
use crate::error::{PowError, PowResult};

/// Input DTO for submit solution
#[derive(Debug, Clone)]
pub struct SubmitSolutionInput {
    pub solution: PowSolution,
    /// Telemetry only - not trusted
    pub solve_time_ms: Option<u64>,
}

/// Submit Solution Use Case
pub struct SubmitSolutionUseCase<C, T>
where
    C: ChallengeRepository,
    T: WorkTokenRepository,
{
    challenge_repo: Arc<C>,
    token_repo: Arc<T>,
    pow: Arc<ProofOfWork>,
}

impl<C, T> SubmitSolutionUseCase<C, T>
where
    C: ChallengeRepository,
    T: WorkTokenRepository,
{
    pub fn new(challenge_repo: Arc<C>, token_repo: Arc<T>, pow: Arc<ProofOfWork>) -> Self {
        Self {
            challenge_repo,
            token_repo,
            pow,
        }
    }

    pub async fn execute(&self, input: SubmitSolutionInput) -> PowResult<WorkToken> {
        let solution = input.solution;

        if let Some(solve_time_ms) = input.solve_time_ms {
            tracing::info!(
                challenge_id = %solution.challenge_id,
                solve_time_ms,
                "Submit telemetry (not verified)"
            );
        }

        // Consumed before verification: a wrong answer burns the challenge too
        let challenge = self
            .challenge_repo
            .consume(&solution.challenge_id)
            .await?
            .ok_or(PowError::ChallengeNotFound)?;

        if challenge.is_expired() {
            tracing::warn!(challenge_id = %challenge.challenge_id, "Challenge expired");
            return Err(PowError::ChallengeExpired);
        }

        if !self.pow.verify_solution(&solution, &challenge) {
            tracing::warn!(
                challenge_id = %challenge.challenge_id,
                nonce = solution.nonce,
                "Invalid solution"
            );
            return Err(PowError::InvalidSolution);
        }

        let token = self.pow.generate_work_token();
        self.token_repo
            .create(&token.digest(), token.expires_at_ms)
            .await?;

        tracing::info!(
            challenge_id = %challenge.challenge_id,
            difficulty = challenge.difficulty.bits(),
            "PoW verification successful"
        );

        Ok(token)
    }
}
