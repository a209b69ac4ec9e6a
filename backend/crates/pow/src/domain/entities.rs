//! Domain Entities
//!
//! Core business entities for the PoW domain.

use chrono::{DateTime, Utc};

use crate::domain::value_objects::Difficulty;

/// A puzzle issued to a client. Never mutated after issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowChallenge {
    /// 128-bit random value, lowercase hex
    pub challenge_id: String,
    pub difficulty: Difficulty,
    /// Prefix upper bound derived from the difficulty, for debugging
    pub target_hash: String,
    pub expires_at_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl PowChallenge {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }
}

/// A client's answer to a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowSolution {
    pub challenge_id: String,
    pub nonce: u64,
    /// SHA-256 of `challenge_id:nonce`, lowercase hex
    pub hash: String,
}

/// Short-lived bearer credential issued after a verified solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkToken {
    /// Two 128-bit hex values joined by `.`
    pub token: String,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
}

impl WorkToken {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Digest under which the token is stored
    pub fn digest(&self) -> String {
        token_digest(&self.token)
    }
}

/// SHA-256 of a presented token; raw tokens never reach a store
pub fn token_digest(token: &str) -> String {
    platform::crypto::sha256_hex(token.as_bytes())
}
