//! Expiry Maintenance
//!
//! Periodically drops rate-limit hits older than the longest route window,
//! expired PoW challenges and work tokens, and idle keys in the limiter's
//! process-local window. Runs against whichever backend was chosen at startup.

use pow::domain::repository::ExpiredPowRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::application::security_check::SecurityMiddleware;
use crate::domain::collaborators::{CaptchaVerifier, RiskScorer};
use crate::domain::repository::{GuardStore, PowStore, RateLimitRetention};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// What one sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rate_limit_entries: u64,
    pub local_keys: usize,
    pub challenges: u64,
    pub work_tokens: u64,
}

pub struct Maintenance<G, P, R, C>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    gate: Arc<SecurityMiddleware<G, P, R, C>>,
    store: Arc<G>,
    pow_store: Arc<P>,
}

impl<G, P, R, C> Maintenance<G, P, R, C>
where
    G: GuardStore,
    P: PowStore,
    R: RiskScorer + Send + Sync + 'static,
    C: CaptchaVerifier + Send + Sync + 'static,
{
    pub fn new(gate: Arc<SecurityMiddleware<G, P, R, C>>, store: Arc<G>, pow_store: Arc<P>) -> Self {
        Self {
            gate,
            store,
            pow_store,
        }
    }

    /// Run one sweep. Store failures are logged and count as nothing removed.
    pub async fn sweep(&self) -> SweepReport {
        let max_window_ms = self.gate.config().max_window().as_millis() as i64;
        let mut report = SweepReport {
            local_keys: self.gate.rate_limiter().sweep_local(),
            ..SweepReport::default()
        };

        match self.store.cleanup_expired(max_window_ms).await {
            Ok(removed) => report.rate_limit_entries = removed,
            Err(e) => tracing::warn!(error = %e, "Rate limit cleanup failed"),
        }

        match self.pow_store.cleanup_expired().await {
            Ok((challenges, work_tokens)) => {
                report.challenges = challenges;
                report.work_tokens = work_tokens;
            }
            Err(e) => tracing::warn!(error = %e, "PoW cleanup failed"),
        }

        tracing::debug!(
            rate_limit_entries = report.rate_limit_entries,
            local_keys = report.local_keys,
            challenges = report.challenges,
            work_tokens = report.work_tokens,
            "Expired data swept"
        );
        report
    }

    /// Sweep now and then every `every` until the runtime shuts down
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
