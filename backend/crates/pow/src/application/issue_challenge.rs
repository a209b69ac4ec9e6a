//! Issue Challenge Use Case

use std::sync::Arc;

use crate::application::proof_of_work::ProofOfWork;
use crate::domain::entities::PowChallenge;
use crate::domain::repository::ChallengeRepository;
use crate::domain::value_objects::Difficulty;
use crate::error::PowResult;

/// Issue Challenge Use Case
pub struct IssueChallengeUseCase<C>
where
    C: ChallengeRepository,
{
    challenge_repo: Arc<C>,
    pow: Arc<ProofOfWork>,
}

impl<C> IssueChallengeUseCase<C>
where
    C: ChallengeRepository,
{
    pub fn new(challenge_repo: Arc<C>, pow: Arc<ProofOfWork>) -> Self {
        Self {
            challenge_repo,
            pow,
        }
    }

    pub async fn execute(&self, difficulty: Difficulty) -> PowResult<PowChallenge> {
        let challenge = self.pow.generate_challenge(difficulty);

        self.challenge_repo.create(&challenge).await?;

        tracing::info!(
            challenge_id = %challenge.challenge_id,
            difficulty = difficulty.bits(),
            "Issued challenge"
        );

        Ok(challenge)
    }
}
