//! Security Gate Middleware
//!
//! Runs the security check for every request on the layered routes and maps
//! the verdict onto an HTTP response.

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use kernel::error::app_error::AppError;
use std::sync::Arc;

use crate::application::security_check::{RequestContext, SecurityMiddleware};
use crate::application::telemetry::GATE_REQUIRED_HEADER;
use crate::domain::collaborators::{CaptchaVerifier, RiskScorer};
use crate::domain::decision::{CheckReason, SecurityCheckResult};
use crate::domain::repository::{GuardStore, PowStore};
use crate::presentation::dto::GateRequiredResponse;

/// Identity placed in request extensions by an upstream auth layer
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

/// `axum::middleware::from_fn_with_state` entry point
///
/// Allowed requests continue with the `SecurityCheckResult` in their
/// extensions. Gated requests get a 401 naming the gate; blocked ones a 429
/// (rate limited) or 403.
pub async fn security_gate<G, P, R, C>(
    State(gate): State<Arc<SecurityMiddleware<G, P, R, C>>>,
    mut req: Request,
    next: Next,
) -> Response
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    let mut ctx = RequestContext::new(
        req.method().clone(),
        req.uri().path(),
        req.headers().clone(),
    );
    if let Some(user) = req.extensions().get::<AuthenticatedUser>() {
        ctx = ctx.with_user_id(user.0.clone());
    }

    let result = gate.check(&ctx).await;
    let telemetry = gate.telemetry();

    if result.allowed {
        let debug_headers = telemetry.get_debug_headers(result.risk_score, None);
        req.extensions_mut().insert(result);
        let mut response = next.run(req).await;
        response.headers_mut().extend(debug_headers);
        return response;
    }

    if let Some(kind) = result.gate_required {
        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(GateRequiredResponse {
                gate: kind,
                retryable: true,
            }),
        )
            .into_response();
        let headers = response.headers_mut();
        headers.extend(telemetry.get_debug_headers(result.risk_score, Some(kind)));
        headers.insert(GATE_REQUIRED_HEADER, HeaderValue::from_static(kind.as_str()));
        return response;
    }

    blocked_response(&result)
}

fn blocked_response(result: &SecurityCheckResult) -> Response {
    match (result.reason, result.retry_after) {
        (Some(CheckReason::RateLimited), Some(seconds)) => {
            AppError::too_many_requests("Too many requests")
                .with_retry_after(seconds)
                .into_response()
        }
        (Some(CheckReason::RateLimited), None) => {
            AppError::too_many_requests("Too many requests").into_response()
        }
        _ => AppError::forbidden("Request blocked").into_response(),
    }
}
