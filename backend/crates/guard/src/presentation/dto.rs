//! API DTOs (Data Transfer Objects)

use pow::{PowChallenge, WorkToken};
use serde::{Deserialize, Serialize};

use crate::domain::decision::GateKind;
use crate::domain::flags::FeatureFlagSet;

/// Response for GET /api/pow/challenge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub difficulty: u8,
    pub target_hash: String,
    pub expires_at: i64,
    pub estimated_solve_time_ms: u64,
}

impl ChallengeResponse {
    pub fn new(challenge: PowChallenge, estimated_solve_time_ms: u64) -> Self {
        Self {
            difficulty: challenge.difficulty.bits(),
            challenge_id: challenge.challenge_id,
            target_hash: challenge.target_hash,
            expires_at: challenge.expires_at_ms,
            estimated_solve_time_ms,
        }
    }
}

/// Request for POST /api/pow/verify
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub challenge_id: String,
    pub nonce: u64,
    pub hash: String,
    #[serde(default)]
    pub solve_time_ms: Option<u64>,
}

/// Response for POST /api/pow/verify
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkTokenResponse {
    pub token: String,
    pub expires_at: i64,
}

impl From<WorkToken> for WorkTokenResponse {
    fn from(token: WorkToken) -> Self {
        Self {
            token: token.token,
            expires_at: token.expires_at_ms,
        }
    }
}

/// Body of a 401 returned by the gate
#[derive(Debug, Clone, Serialize)]
pub struct GateRequiredResponse {
    pub gate: GateKind,
    pub retryable: bool,
}

/// Response for GET /api/security/flags
#[derive(Debug, Clone, Serialize)]
pub struct FlagsResponse {
    pub flags: FeatureFlagSet,
    pub defaults: FeatureFlagSet,
}

/// Request for PUT /api/security/flags/{name}
#[derive(Debug, Clone, Deserialize)]
pub struct SetFlagRequest {
    pub enabled: bool,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Response for PUT /api/security/flags/{name}
#[derive(Debug, Clone, Serialize)]
pub struct SetFlagResponse {
    pub name: &'static str,
    pub enabled: bool,
}
