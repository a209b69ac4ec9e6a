//! Rate Limiting Infrastructure
//!
//! Sliding-window configuration, presets, the storage trait implemented by
//! durable backends, and the process-local window used when no durable
//! backend answers.

use dashmap::DashMap;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::Duration;

/// Hard cap on remembered hits per key in the process-local window
const MAX_HITS_PER_KEY: usize = 10_000;

/// Rate limit configuration for one route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Route key the counters are scoped to (e.g. `login`)
    pub route_key: Cow<'static, str>,
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Sliding window length
    pub window: Duration,
    /// Count only failed attempts
    pub skip_if_successful: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitPreset::GeneralApi.config()
    }
}

impl RateLimitConfig {
    pub fn new(route_key: impl Into<Cow<'static, str>>, max_requests: u32, window: Duration) -> Self {
        Self {
            route_key: route_key.into(),
            max_requests,
            window,
            skip_if_successful: false,
        }
    }

    pub fn skip_if_successful(mut self) -> Self {
        self.skip_if_successful = true;
        self
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// Built-in limits for the routes every deployment has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitPreset {
    /// 5 failed attempts per 15 minutes
    Login,
    /// 3 per hour
    Signup,
    /// 3 per hour
    PasswordReset,
    /// 3 per hour
    ContactForm,
    /// 5 per hour
    SupportForm,
    /// 100 per minute
    GeneralApi,
    /// 30 per minute
    SearchApi,
}

impl RateLimitPreset {
    pub const ALL: [RateLimitPreset; 7] = [
        RateLimitPreset::Login,
        RateLimitPreset::Signup,
        RateLimitPreset::PasswordReset,
        RateLimitPreset::ContactForm,
        RateLimitPreset::SupportForm,
        RateLimitPreset::GeneralApi,
        RateLimitPreset::SearchApi,
    ];

    pub const fn key(&self) -> &'static str {
        match self {
            RateLimitPreset::Login => "login",
            RateLimitPreset::Signup => "signup",
            RateLimitPreset::PasswordReset => "password_reset",
            RateLimitPreset::ContactForm => "contact_form",
            RateLimitPreset::SupportForm => "support_form",
            RateLimitPreset::GeneralApi => "general_api",
            RateLimitPreset::SearchApi => "search_api",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.key() == key)
    }

    pub fn config(&self) -> RateLimitConfig {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;

        let (max_requests, window_secs) = match self {
            RateLimitPreset::Login => (5, 15 * MINUTE),
            RateLimitPreset::Signup => (3, HOUR),
            RateLimitPreset::PasswordReset => (3, HOUR),
            RateLimitPreset::ContactForm => (3, HOUR),
            RateLimitPreset::SupportForm => (5, HOUR),
            RateLimitPreset::GeneralApi => (100, MINUTE),
            RateLimitPreset::SearchApi => (30, MINUTE),
        };

        let config = RateLimitConfig::new(self.key(), max_requests, Duration::from_secs(window_secs));
        match self {
            RateLimitPreset::Login => config.skip_if_successful(),
            _ => config,
        }
    }
}

/// Counted hits inside the current window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub count: u32,
    /// Timestamp of the oldest counted hit
    pub oldest_ms: Option<i64>,
}

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: i64,
    /// Whole seconds until a slot frees up, only when denied
    pub retry_after: Option<u64>,
}

impl RateLimitResult {
    /// Derive the decision from the hits counted in the window
    pub fn from_stats(config: &RateLimitConfig, stats: WindowStats, now_ms: i64) -> Self {
        let window_ms = config.window_ms();
        let allowed = stats.count < config.max_requests;
        let reset_at_ms = stats.oldest_ms.map_or(now_ms + window_ms, |oldest| oldest + window_ms);

        let retry_after = if allowed {
            None
        } else {
            let wait_ms = (reset_at_ms - now_ms).max(1);
            Some(((wait_ms + 999) / 1000) as u64)
        };

        Self {
            allowed,
            remaining: config.max_requests.saturating_sub(stats.count),
            reset_at_ms,
            retry_after,
        }
    }
}

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Trait for durable rate limit storage backends
///
/// Every recorded request is its own entry, so concurrent writers never
/// overwrite each other's counts.
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Count hits for `(identifier, route_key)` at or after `since_ms`
    async fn window_stats(
        &self,
        identifier: &str,
        route_key: &str,
        since_ms: i64,
        failures_only: bool,
    ) -> Result<WindowStats, StoreError>;

    /// Record one request
    async fn record(
        &self,
        identifier: &str,
        route_key: &str,
        at_ms: i64,
        success: bool,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    at_ms: i64,
    success: bool,
}

/// Process-local sliding window keyed by `identifier:route_key`
///
/// Each key's hits sit behind the map's per-entry lock, so a read-prune-count
/// or prune-push sequence for one key is atomic.
#[derive(Debug, Default)]
pub struct SlidingWindow {
    hits: DashMap<String, VecDeque<Hit>>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(identifier: &str, route_key: &str) -> String {
        format!("{identifier}:{route_key}")
    }

    pub fn stats(&self, key: &str, since_ms: i64, failures_only: bool) -> WindowStats {
        let Some(mut entry) = self.hits.get_mut(key) else {
            return WindowStats::default();
        };

        prune(&mut entry, since_ms);
        let mut stats = WindowStats::default();
        for hit in entry.iter().filter(|hit| !(failures_only && hit.success)) {
            stats.count += 1;
            stats.oldest_ms.get_or_insert(hit.at_ms);
        }

        let empty = entry.is_empty();
        drop(entry);
        if empty {
            self.hits.remove_if(key, |_, hits| hits.is_empty());
        }
        stats
    }

    pub fn record(&self, key: &str, at_ms: i64, success: bool, since_ms: i64) {
        let mut entry = self.hits.entry(key.to_string()).or_default();
        prune(&mut entry, since_ms);
        if entry.len() >= MAX_HITS_PER_KEY {
            entry.pop_front();
        }
        entry.push_back(Hit { at_ms, success });
    }

    /// Prune every key to `since_ms` and drop keys left empty, returning how
    /// many keys were dropped
    pub fn sweep(&self, since_ms: i64) -> usize {
        let before = self.hits.len();
        self.hits.retain(|_, hits| {
            prune(hits, since_ms);
            !hits.is_empty()
        });
        before.saturating_sub(self.hits.len())
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

fn prune(hits: &mut VecDeque<Hit>, since_ms: i64) {
    while hits.front().is_some_and(|hit| hit.at_ms < since_ms) {
        hits.pop_front();
    }
}
