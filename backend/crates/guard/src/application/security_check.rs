//! Security Middleware
//!
//! Per-request pipeline: rate check, risk score, policy evaluation, gate
//! pass recognition, telemetry. Any error along the way fails open.

use axum::http::{HeaderMap, Method};
use platform::client::{extract_client_ip, extract_user_agent};
use pow::application::check_token::CheckWorkTokenUseCase;
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;

use crate::application::config::GuardConfig;
use crate::application::feature_flags::FeatureFlagsManager;
use crate::application::rate_limiter::RateLimiter;
use crate::application::telemetry::SecurityTelemetry;
use crate::domain::collaborators::{CaptchaVerifier, RiskScorer};
use crate::domain::decision::{GateKind, PolicyDecision, SecurityCheckResult, evaluate_policy};
use crate::domain::events::{SecurityEvent, SecurityEventType};
use crate::domain::repository::{GuardStore, PowStore};
use crate::error::{GuardError, GuardResult};

/// Work token from a solved PoW challenge
pub const WORK_TOKEN_HEADER: &str = "x-work-token";
/// Provider token from a solved CAPTCHA
pub const CAPTCHA_TOKEN_HEADER: &str = "x-captcha-token";

/// What the gate sees of an inbound request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub user_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Client identity resolved once per request
struct Client<'a> {
    ip: IpAddr,
    user_agent: &'a str,
}

pub struct SecurityMiddleware<G, P, R, C>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    config: Arc<GuardConfig>,
    rate_limiter: RateLimiter<G>,
    flags: Arc<FeatureFlagsManager<G>>,
    telemetry: Arc<SecurityTelemetry>,
    work_tokens: CheckWorkTokenUseCase<P>,
    risk_scorer: Arc<R>,
    captcha: Arc<C>,
}

impl<G, P, R, C> SecurityMiddleware<G, P, R, C>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    pub fn new(
        config: Arc<GuardConfig>,
        store: Arc<G>,
        pow_store: Arc<P>,
        flags: Arc<FeatureFlagsManager<G>>,
        telemetry: Arc<SecurityTelemetry>,
        risk_scorer: Arc<R>,
        captcha: Arc<C>,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(store, config.store_timeout),
            work_tokens: CheckWorkTokenUseCase::new(pow_store),
            config,
            flags,
            telemetry,
            risk_scorer,
            captcha,
        }
    }

    /// Decide the request. Never fails: errors yield an allowed `fail_open` result.
    pub async fn check(&self, ctx: &RequestContext) -> SecurityCheckResult {
        let client = Client {
            ip: extract_client_ip(&ctx.headers),
            user_agent: extract_user_agent(&ctx.headers),
        };

        match self.evaluate(ctx, &client).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    method = %ctx.method,
                    path = %ctx.path,
                    ip = %client.ip,
                    "security_middleware_error"
                );
                self.telemetry.log_event(
                    self.event(SecurityEventType::SecurityMiddlewareError, ctx, &client)
                        .data(json!({ "error": e.to_string() })),
                );
                SecurityCheckResult::fail_open()
            }
        }
    }

    /// Limiter for routes that record their own outcome
    pub fn rate_limiter(&self) -> &RateLimiter<G> {
        &self.rate_limiter
    }

    pub fn flags(&self) -> &FeatureFlagsManager<G> {
        &self.flags
    }

    pub fn telemetry(&self) -> &SecurityTelemetry {
        &self.telemetry
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    async fn evaluate(&self, ctx: &RequestContext, client: &Client<'_>) -> GuardResult<SecurityCheckResult> {
        if let Some(limit) = self.config.route_limit_for(&ctx.path) {
            let identifier = client.ip.to_string();
            let outcome = self.rate_limiter.check_limit(&identifier, limit).await;

            if !outcome.allowed {
                self.telemetry.log_event(
                    self.event(SecurityEventType::RateLimited, ctx, client)
                        .blocked(true)
                        .data(json!({
                            "route": limit.route_key,
                            "retryAfter": outcome.retry_after,
                        })),
                );
                return Ok(SecurityCheckResult::rate_limited(outcome.retry_after));
            }

            if !limit.skip_if_successful {
                self.rate_limiter.record_request(&identifier, limit, true).await;
            }
        }

        let score = tokio::time::timeout(
            self.config.risk_timeout,
            self.risk_scorer.calculate_risk(
                client.ip,
                ctx.user_id.as_deref(),
                client.user_agent,
                &ctx.path,
            ),
        )
        .await
        .map_err(|_| GuardError::timeout("risk_scorer"))??
        .score();

        let flags = self.flags.get_flags().await;

        let result = match evaluate_policy(score, &flags, &self.config.thresholds) {
            PolicyDecision::Allow => SecurityCheckResult::allowed(score),
            PolicyDecision::Block { reason } => SecurityCheckResult::blocked(score, reason),
            PolicyDecision::Gate { kind, reason } => {
                if self.gate_passed(kind, ctx, client).await? {
                    SecurityCheckResult::gate_passed(score)
                } else {
                    SecurityCheckResult::gated(kind, score, reason)
                }
            }
        };

        let event_type = match (result.allowed, result.gate_required) {
            (true, _) => SecurityEventType::RequestAllowed,
            (false, Some(GateKind::Captcha)) => SecurityEventType::CaptchaRequired,
            (false, Some(GateKind::Pow)) => SecurityEventType::PowRequired,
            (false, None) => SecurityEventType::RequestBlocked,
        };
        self.telemetry.log_event(
            self.event(event_type, ctx, client)
                .blocked(result.is_blocked())
                .risk_score(result.risk_score)
                .data(json!({ "reason": result.reason })),
        );

        Ok(result)
    }

    /// Whether the request carries proof of having passed `kind` already
    async fn gate_passed(&self, kind: GateKind, ctx: &RequestContext, client: &Client<'_>) -> GuardResult<bool> {
        match kind {
            GateKind::Pow => {
                let Some(token) = ctx.header(WORK_TOKEN_HEADER) else {
                    return Ok(false);
                };
                let valid = tokio::time::timeout(self.config.store_timeout, self.work_tokens.check(token))
                    .await
                    .map_err(|_| GuardError::timeout("work_token_check"))??;
                if !valid {
                    tracing::debug!(ip = %client.ip, "Rejected work token");
                }
                Ok(valid)
            }
            GateKind::Captcha => {
                let Some(token) = ctx.header(CAPTCHA_TOKEN_HEADER) else {
                    return Ok(false);
                };
                let success = tokio::time::timeout(
                    self.config.risk_timeout,
                    self.captcha.verify(token, client.ip),
                )
                .await
                .map_err(|_| GuardError::timeout("captcha_verify"))??;

                self.telemetry.log_event(
                    self.event(SecurityEventType::CaptchaAttempt, ctx, client)
                        .data(json!({ "success": success })),
                );
                Ok(success)
            }
        }
    }

    fn event(&self, event_type: SecurityEventType, ctx: &RequestContext, client: &Client<'_>) -> SecurityEvent {
        SecurityEvent::new(event_type)
            .ip(client.ip)
            .user_id(ctx.user_id.clone())
            .user_agent(client.user_agent)
            .endpoint(ctx.path.as_str())
    }
}
