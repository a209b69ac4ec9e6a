//! Domain Services
//!
//! Pure domain logic for PoW hashing.

use std::time::Duration;

use crate::domain::value_objects::Difficulty;

/// Upper bound shown to users for a solve, whatever the difficulty
pub const MAX_ESTIMATED_SOLVE: Duration = Duration::from_secs(300);

/// SHA-256 of `challenge_id:nonce`, lowercase hex
pub fn solution_hash(challenge_id: &str, nonce: u64) -> String {
    platform::crypto::sha256_hex(format!("{challenge_id}:{nonce}").as_bytes())
}

/// Rough solve time for UX copy; never used to accept or reject anything
///
/// One second at 16 bits, doubling per extra bit, capped at five minutes.
pub fn estimated_solve_time(difficulty: Difficulty) -> Duration {
    let extra_bits = difficulty.bits().saturating_sub(16);
    // 2^9 seconds already exceeds the cap
    if extra_bits >= 9 {
        return MAX_ESTIMATED_SOLVE;
    }
    Duration::from_millis(1000u64 << extra_bits).min(MAX_ESTIMATED_SOLVE)
}
