//! Security Events and Audit Entries

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::net::IpAddr;

/// Kinds of events the subsystem records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    RequestAllowed,
    CaptchaRequired,
    PowRequired,
    RequestBlocked,
    RateLimited,
    CaptchaAttempt,
    PowVerified,
    PowRejected,
    SecurityMiddlewareError,
}

impl SecurityEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::RequestAllowed => "request_allowed",
            SecurityEventType::CaptchaRequired => "captcha_required",
            SecurityEventType::PowRequired => "pow_required",
            SecurityEventType::RequestBlocked => "request_blocked",
            SecurityEventType::RateLimited => "rate_limited",
            SecurityEventType::CaptchaAttempt => "captcha_attempt",
            SecurityEventType::PowVerified => "pow_verified",
            SecurityEventType::PowRejected => "pow_rejected",
            SecurityEventType::SecurityMiddlewareError => "security_middleware_error",
        }
    }

    /// Events emitted once per gated request (counted as traffic)
    pub const fn is_request_decision(&self) -> bool {
        matches!(
            self,
            SecurityEventType::RequestAllowed
                | SecurityEventType::CaptchaRequired
                | SecurityEventType::PowRequired
                | SecurityEventType::RequestBlocked
                | SecurityEventType::RateLimited
                | SecurityEventType::SecurityMiddlewareError
        )
    }
}

/// Append-only record of something the gate decided or observed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub ip: Option<IpAddr>,
    pub user_id: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub data: Option<Value>,
    pub blocked: bool,
    pub risk_score: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType) -> Self {
        Self {
            event_type,
            ip: None,
            user_id: None,
            user_agent: None,
            endpoint: None,
            data: None,
            blocked: false,
            risk_score: None,
            created_at: Utc::now(),
        }
    }

    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        self.user_agent = (!user_agent.is_empty()).then_some(user_agent);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn blocked(mut self, blocked: bool) -> Self {
        self.blocked = blocked;
        self
    }

    pub fn risk_score(mut self, risk_score: Option<u8>) -> Self {
        self.risk_score = risk_score;
        self
    }
}

pub const FLAG_UPDATE_ACTION: &str = "feature_flag.update";

/// Who changed what, kept for operators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub target: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn flag_update(actor: &str, flag_name: &str, new_value: bool) -> Self {
        let created_at = Utc::now();
        Self {
            actor: actor.to_string(),
            action: FLAG_UPDATE_ACTION.to_string(),
            target: flag_name.to_string(),
            metadata: serde_json::json!({
                "new_value": new_value,
                "timestamp": created_at.to_rfc3339(),
            }),
            created_at,
        }
    }
}
