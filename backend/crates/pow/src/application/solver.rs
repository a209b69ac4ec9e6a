//! Nonce search
//!
//! The reference solver a client runs: counts nonces upward until the hash
//! meets the target. It is cooperative, handing control back to the runtime
//! every [`YIELD_EVERY`] hashes so one solve cannot starve other tasks on a
//! single-threaded executor.

use std::time::Duration;
use tokio::time::Instant;

use crate::domain::entities::{PowChallenge, PowSolution};
use crate::domain::services::solution_hash;

pub const YIELD_EVERY: u64 = 1_000;
pub const SOLVE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Solve with the standard five-minute budget
pub async fn solve_challenge(challenge: &PowChallenge) -> Option<PowSolution> {
    solve_challenge_within(challenge, SOLVE_TIMEOUT).await
}

/// Solve, giving up with `None` once `timeout` has elapsed
pub async fn solve_challenge_within(
    challenge: &PowChallenge,
    timeout: Duration,
) -> Option<PowSolution> {
    let target = challenge.difficulty.target();
    let started = Instant::now();

    for nonce in 0u64.. {
        let hash = solution_hash(&challenge.challenge_id, nonce);
        if target.is_met_by(&hash) {
            tracing::debug!(
                challenge_id = %challenge.challenge_id,
                nonce,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Challenge solved"
            );
            return Some(PowSolution {
                challenge_id: challenge.challenge_id.clone(),
                nonce,
                hash,
            });
        }

        if nonce % YIELD_EVERY == YIELD_EVERY - 1 {
            if started.elapsed() >= timeout {
                tracing::debug!(
                    challenge_id = %challenge.challenge_id,
                    attempts = nonce + 1,
                    "Solve timed out"
                );
                return None;
            }
            tokio::task::yield_now().await;
        }
    }

    None
}
