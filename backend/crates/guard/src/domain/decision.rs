//! Risk Policy and Check Results

use serde::Serialize;
use std::fmt;

use crate::domain::flags::FeatureFlagSet;

/// Challenge a client must pass before the request proceeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Captcha,
    Pow,
}

impl GateKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GateKind::Captcha => "captcha",
            GateKind::Pow => "pow",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request ended up where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckReason {
    RateLimited,
    SevereRisk,
    ElevatedRisk,
    UnderAttack,
    CaptchaAlwaysOn,
    GatePassed,
    FailOpen,
}

impl CheckReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CheckReason::RateLimited => "rate_limited",
            CheckReason::SevereRisk => "severe_risk",
            CheckReason::ElevatedRisk => "elevated_risk",
            CheckReason::UnderAttack => "under_attack",
            CheckReason::CaptchaAlwaysOn => "captcha_always_on",
            CheckReason::GatePassed => "gate_passed",
            CheckReason::FailOpen => "fail_open",
        }
    }
}

impl fmt::Display for CheckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk score cut-offs, inclusive lower bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskThresholds {
    pub medium: u8,
    pub high: u8,
    pub severe: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 50,
            high: 75,
            severe: 90,
        }
    }
}

impl RiskThresholds {
    /// Rejects unordered or out-of-range cut-offs
    pub fn new(medium: u8, high: u8, severe: u8) -> Option<Self> {
        (medium <= high && high <= severe && severe <= 100).then_some(Self {
            medium,
            high,
            severe,
        })
    }
}

/// Outcome of the policy table before any gate pass is considered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Gate { kind: GateKind, reason: CheckReason },
    Block { reason: CheckReason },
}

/// First matching rule wins:
///
/// | rule | outcome |
/// |---|---|
/// | score >= severe | block |
/// | UNDER_ATTACK and score >= medium | CAPTCHA |
/// | score >= high and POW_ENFORCE_HIGH_RISK | PoW |
/// | score >= medium or CAPTCHA_ALWAYS_ON | CAPTCHA |
/// | otherwise | allow |
pub fn evaluate_policy(
    score: u8,
    flags: &FeatureFlagSet,
    thresholds: &RiskThresholds,
) -> PolicyDecision {
    if score >= thresholds.severe {
        return PolicyDecision::Block {
            reason: CheckReason::SevereRisk,
        };
    }
    if flags.under_attack && score >= thresholds.medium {
        return PolicyDecision::Gate {
            kind: GateKind::Captcha,
            reason: CheckReason::UnderAttack,
        };
    }
    if score >= thresholds.high && flags.pow_enforce_high_risk {
        return PolicyDecision::Gate {
            kind: GateKind::Pow,
            reason: CheckReason::ElevatedRisk,
        };
    }
    if score >= thresholds.medium {
        return PolicyDecision::Gate {
            kind: GateKind::Captcha,
            reason: CheckReason::ElevatedRisk,
        };
    }
    if flags.captcha_always_on {
        return PolicyDecision::Gate {
            kind: GateKind::Captcha,
            reason: CheckReason::CaptchaAlwaysOn,
        };
    }
    PolicyDecision::Allow
}

/// Per-request verdict handed to the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityCheckResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_required: Option<GateKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CheckReason>,
    /// Seconds, only for rate-limited requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl SecurityCheckResult {
    pub fn allowed(risk_score: u8) -> Self {
        Self {
            allowed: true,
            gate_required: None,
            risk_score: Some(risk_score),
            reason: None,
            retry_after: None,
        }
    }

    pub fn gate_passed(risk_score: u8) -> Self {
        Self {
            reason: Some(CheckReason::GatePassed),
            ..Self::allowed(risk_score)
        }
    }

    pub fn gated(kind: GateKind, risk_score: u8, reason: CheckReason) -> Self {
        Self {
            allowed: false,
            gate_required: Some(kind),
            risk_score: Some(risk_score),
            reason: Some(reason),
            retry_after: None,
        }
    }

    pub fn blocked(risk_score: u8, reason: CheckReason) -> Self {
        Self {
            allowed: false,
            gate_required: None,
            risk_score: Some(risk_score),
            reason: Some(reason),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        Self {
            allowed: false,
            gate_required: None,
            risk_score: None,
            reason: Some(CheckReason::RateLimited),
            retry_after,
        }
    }

    pub fn fail_open() -> Self {
        Self {
            allowed: true,
            gate_required: None,
            risk_score: None,
            reason: Some(CheckReason::FailOpen),
            retry_after: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        !self.allowed && self.gate_required.is_none()
    }
}
