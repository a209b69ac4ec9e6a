//! HTTP Handlers

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, header};
use kernel::error::app_error::{AppError, AppResult};
use platform::client::{extract_client_ip, extract_user_agent};
use platform::crypto::constant_time_eq;
use pow::application::issue_challenge::IssueChallengeUseCase;
use pow::application::submit_solution::{SubmitSolutionInput, SubmitSolutionUseCase};
use pow::{PowSolution, ProofOfWork};
use serde_json::json;
use std::sync::Arc;

use crate::application::config::GuardConfig;
use crate::application::security_check::SecurityMiddleware;
use crate::application::telemetry::SecurityMetrics;
use crate::domain::collaborators::{CaptchaVerifier, RiskScorer};
use crate::domain::decision::SecurityCheckResult;
use crate::domain::events::{SecurityEvent, SecurityEventType};
use crate::domain::flags::FeatureFlag;
use crate::domain::repository::{GuardStore, PowStore};
use crate::error::GuardResult;

/// Public path of the challenge endpoint, used as its rate-limit route
pub const CHALLENGE_PATH: &str = "/api/pow/challenge";
use crate::presentation::dto::{
    ChallengeResponse, FlagsResponse, SetFlagRequest, SetFlagResponse, VerifyRequest,
    WorkTokenResponse,
};

/// Shared state for gate handlers
pub struct GuardAppState<G, P, R, C>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    pub gate: Arc<SecurityMiddleware<G, P, R, C>>,
    pub pow_store: Arc<P>,
    pub pow: Arc<ProofOfWork>,
}

impl<G, P, R, C> Clone for GuardAppState<G, P, R, C>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            pow_store: self.pow_store.clone(),
            pow: self.pow.clone(),
        }
    }
}

/// GET /api/pow/challenge
///
/// Ungated, so it carries the configured route limit for its own path.
pub async fn issue_challenge<G, P, R, C>(
    State(state): State<GuardAppState<G, P, R, C>>,
    headers: HeaderMap,
) -> AppResult<Json<ChallengeResponse>>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    if let Some(limit) = state.gate.config().route_limit_for(CHALLENGE_PATH) {
        let client_ip = extract_client_ip(&headers);
        let ip = client_ip.to_string();
        let limiter = state.gate.rate_limiter();
        let result = limiter.check_limit(&ip, limit).await;
        if !result.allowed {
            state.gate.telemetry().log_event(
                SecurityEvent::new(SecurityEventType::RateLimited)
                    .ip(client_ip)
                    .user_agent(extract_user_agent(&headers))
                    .endpoint(CHALLENGE_PATH)
                    .blocked(true),
            );
            let error = AppError::too_many_requests("Too many challenge requests");
            return Err(match result.retry_after {
                Some(seconds) => error.with_retry_after(seconds),
                None => error,
            });
        }
        limiter.record_request(&ip, limit, true).await;
    }

    let under_attack = state.gate.flags().get_flag(FeatureFlag::UnderAttack).await;
    let difficulty = state.pow.config().difficulty_for(under_attack);

    let use_case = IssueChallengeUseCase::new(state.pow_store.clone(), state.pow.clone());
    let challenge = use_case.execute(difficulty).await?;

    let estimate = state.pow.estimated_solve_time(difficulty).as_millis() as u64;
    Ok(Json(ChallengeResponse::new(challenge, estimate)))
}

/// POST /api/pow/verify
pub async fn verify_solution<G, P, R, C>(
    State(state): State<GuardAppState<G, P, R, C>>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> GuardResult<Json<WorkTokenResponse>>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    let event = |event_type| {
        SecurityEvent::new(event_type)
            .ip(extract_client_ip(&headers))
            .user_agent(extract_user_agent(&headers))
            .endpoint("/api/pow/verify")
    };

    let use_case = SubmitSolutionUseCase::new(
        state.pow_store.clone(),
        state.pow_store.clone(),
        state.pow.clone(),
    );
    let input = SubmitSolutionInput {
        solution: PowSolution {
            challenge_id: req.challenge_id.clone(),
            nonce: req.nonce,
            hash: req.hash,
        },
        solve_time_ms: req.solve_time_ms,
    };

    match use_case.execute(input).await {
        Ok(token) => {
            state.gate.telemetry().log_event(event(SecurityEventType::PowVerified).data(json!({
                "challengeId": req.challenge_id,
                "solveTimeMs": req.solve_time_ms,
            })));
            Ok(Json(token.into()))
        }
        Err(e) => {
            state.gate.telemetry().log_event(event(SecurityEventType::PowRejected).data(json!({
                "challengeId": req.challenge_id,
                "error": e.to_string(),
            })));
            Err(e.into())
        }
    }
}

/// GET /api/security/check
///
/// Echoes the verdict of the gate layered in front of it.
pub async fn check_status(
    Extension(result): Extension<SecurityCheckResult>,
) -> Json<SecurityCheckResult> {
    Json(result)
}

/// GET /api/security/metrics
pub async fn get_metrics<G, P, R, C>(
    State(state): State<GuardAppState<G, P, R, C>>,
    headers: HeaderMap,
) -> AppResult<Json<SecurityMetrics>>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    require_admin(state.gate.config(), &headers)?;
    Ok(Json(state.gate.telemetry().get_metrics()))
}

/// GET /api/security/flags
pub async fn get_flags<G, P, R, C>(
    State(state): State<GuardAppState<G, P, R, C>>,
    headers: HeaderMap,
) -> AppResult<Json<FlagsResponse>>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    require_admin(state.gate.config(), &headers)?;
    let flags = state.gate.flags();
    Ok(Json(FlagsResponse {
        flags: flags.get_flags().await,
        defaults: flags.defaults(),
    }))
}

/// PUT /api/security/flags/{name}
pub async fn set_flag<G, P, R, C>(
    State(state): State<GuardAppState<G, P, R, C>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SetFlagRequest>,
) -> AppResult<Json<SetFlagResponse>>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    require_admin(state.gate.config(), &headers)?;

    let flag = name
        .parse::<FeatureFlag>()
        .map_err(|e| AppError::not_found(e.to_string()))?;

    let actor = req.actor.as_deref().unwrap_or("admin");
    if !state.gate.flags().set_flag(flag, req.enabled, Some(actor)).await {
        return Err(AppError::service_unavailable("Flag store unavailable"));
    }

    Ok(Json(SetFlagResponse {
        name: flag.name(),
        enabled: req.enabled,
    }))
}

/// 404 when no admin token is configured, 401 when the bearer does not match
fn require_admin(config: &GuardConfig, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = config.admin_token.as_deref() else {
        return Err(AppError::not_found("Not found"));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");

    if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        tracing::warn!(
            ip = %extract_client_ip(headers),
            "Rejected security admin request"
        );
        Err(AppError::unauthorized("Invalid admin token"))
    }
}
