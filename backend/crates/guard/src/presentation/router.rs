//! Gate Routers

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::domain::collaborators::{CaptchaVerifier, RiskScorer};
use crate::domain::repository::{GuardStore, PowStore};
use crate::presentation::handlers::{self, GuardAppState};

/// PoW endpoints, mounted at `/api/pow`. Must not sit behind the gate.
pub fn challenge_router<G, P, R, C>(state: GuardAppState<G, P, R, C>) -> Router
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    Router::new()
        .route("/challenge", get(handlers::issue_challenge::<G, P, R, C>))
        .route("/verify", post(handlers::verify_solution::<G, P, R, C>))
        .with_state(state)
}

/// Operator endpoints, mounted at `/api/security`
pub fn security_router<G, P, R, C>(state: GuardAppState<G, P, R, C>) -> Router
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    Router::new()
        .route("/metrics", get(handlers::get_metrics::<G, P, R, C>))
        .route("/flags", get(handlers::get_flags::<G, P, R, C>))
        .route("/flags/{name}", put(handlers::set_flag::<G, P, R, C>))
        .with_state(state)
}
