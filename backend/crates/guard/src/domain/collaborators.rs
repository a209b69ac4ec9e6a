//! External Collaborators
//!
//! The risk model and the CAPTCHA provider live outside this crate; the
//! gate only sees these interfaces.

use std::net::IpAddr;

use crate::error::GuardResult;

/// Output of a risk scorer, clamped to `0..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskAssessment {
    score: u8,
}

impl RiskAssessment {
    pub fn new(score: u8) -> Self {
        Self {
            score: score.min(100),
        }
    }

    pub fn score(&self) -> u8 {
        self.score
    }
}

#[trait_variant::make(RiskScorer: Send)]
pub trait LocalRiskScorer {
    async fn calculate_risk(
        &self,
        ip: IpAddr,
        user_id: Option<&str>,
        user_agent: &str,
        path: &str,
    ) -> GuardResult<RiskAssessment>;
}

#[trait_variant::make(CaptchaVerifier: Send)]
pub trait LocalCaptchaVerifier {
    /// Whether the provider accepts `token` for this client
    async fn verify(&self, token: &str, ip: IpAddr) -> GuardResult<bool>;
}

/// Scorer returning the same score for every request
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRiskScorer {
    score: u8,
}

impl StaticRiskScorer {
    pub fn new(score: u8) -> Self {
        Self { score }
    }
}

impl RiskScorer for StaticRiskScorer {
    async fn calculate_risk(
        &self,
        _ip: IpAddr,
        _user_id: Option<&str>,
        _user_agent: &str,
        _path: &str,
    ) -> GuardResult<RiskAssessment> {
        Ok(RiskAssessment::new(self.score))
    }
}

/// Verifier for deployments without a CAPTCHA provider: nothing passes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaptchaProvider;

impl CaptchaVerifier for NoCaptchaProvider {
    async fn verify(&self, _token: &str, _ip: IpAddr) -> GuardResult<bool> {
        Ok(false)
    }
}
