//! Sliding-window Rate Limiter
//!
//! The durable store is authoritative while it answers. Every hit is also
//! mirrored into a process-local window, which takes over when the store
//! errors or times out. Limits are then enforced per process only.
//!
//! Keys whose hits have all aged out of the longest window seen are swept
//! every `SWEEP_EVERY` recorded requests and on `sweep_local`.

use chrono::Utc;
use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore, SlidingWindow, StoreError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Recorded requests between sweeps of the process-local window
pub const SWEEP_EVERY: u64 = 1024;

pub struct RateLimiter<S>
where
    S: RateLimitStore,
{
    store: Arc<S>,
    local: SlidingWindow,
    store_timeout: Duration,
    degraded: AtomicBool,
    /// Longest window any caller has used
    max_window_ms: AtomicI64,
    recorded: AtomicU64,
}

impl<S> RateLimiter<S>
where
    S: RateLimitStore,
{
    pub fn new(store: Arc<S>, store_timeout: Duration) -> Self {
        Self {
            store,
            local: SlidingWindow::new(),
            store_timeout,
            degraded: AtomicBool::new(false),
            max_window_ms: AtomicI64::new(0),
            recorded: AtomicU64::new(0),
        }
    }

    pub async fn check_limit(&self, identifier: &str, config: &RateLimitConfig) -> RateLimitResult {
        let now_ms = Utc::now().timestamp_millis();
        let since_ms = now_ms - config.window_ms();
        let failures_only = config.skip_if_successful;
        self.max_window_ms.fetch_max(config.window_ms(), Ordering::Relaxed);

        let durable = self
            .with_timeout(self.store.window_stats(identifier, &config.route_key, since_ms, failures_only))
            .await;

        let stats = match durable {
            Ok(stats) => {
                self.mark_healthy();
                stats
            }
            Err(e) => {
                self.mark_degraded(&e);
                self.local.stats(
                    &SlidingWindow::key(identifier, &config.route_key),
                    since_ms,
                    failures_only,
                )
            }
        };

        let result = RateLimitResult::from_stats(config, stats, now_ms);
        if !result.allowed {
            tracing::info!(
                identifier = %identifier,
                route = %config.route_key,
                count = stats.count,
                max = config.max_requests,
                retry_after = result.retry_after,
                "Rate limit exceeded"
            );
        }
        result
    }

    pub async fn record_request(&self, identifier: &str, config: &RateLimitConfig, success: bool) {
        let now_ms = Utc::now().timestamp_millis();
        self.max_window_ms.fetch_max(config.window_ms(), Ordering::Relaxed);

        self.local.record(
            &SlidingWindow::key(identifier, &config.route_key),
            now_ms,
            success,
            now_ms - config.window_ms(),
        );
        if (self.recorded.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.sweep_local_at(now_ms);
        }

        match self
            .with_timeout(self.store.record(identifier, &config.route_key, now_ms, success))
            .await
        {
            Ok(()) => self.mark_healthy(),
            Err(e) => self.mark_degraded(&e),
        }
    }

    /// Drop local keys with no hit inside the longest window seen
    pub fn sweep_local(&self) -> usize {
        self.sweep_local_at(Utc::now().timestamp_millis())
    }

    /// Keys currently held by the process-local window
    pub fn local_keys(&self) -> usize {
        self.local.len()
    }

    fn sweep_local_at(&self, now_ms: i64) -> usize {
        let since_ms = now_ms - self.max_window_ms.load(Ordering::Relaxed);
        let dropped = self.local.sweep(since_ms);
        if dropped > 0 {
            tracing::debug!(dropped, remaining = self.local.len(), "Swept idle rate limit keys");
        }
        dropped
    }

    /// Whether the last store call failed
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "rate limit store timed out after {}ms",
                self.store_timeout.as_millis()
            )
            .into()),
        }
    }

    fn mark_degraded(&self, error: &StoreError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                error = %error,
                "Rate limit store unavailable, limiting is now per-process"
            );
        } else {
            tracing::debug!(error = %error, "Rate limit store still unavailable");
        }
    }

    fn mark_healthy(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!("Rate limit store recovered");
        }
    }
}
