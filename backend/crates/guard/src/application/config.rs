//! Application Configuration
//!
//! Configuration for the request gate.

use platform::rate_limit::{RateLimitConfig, RateLimitPreset};
use std::borrow::Cow;
use std::time::Duration;

use crate::domain::decision::RiskThresholds;
use crate::domain::flags::FeatureFlagSet;
use crate::error::{GuardError, GuardResult};
use crate::infra::writer::DEFAULT_CAPACITY;

/// Rate limit applied to every path under `path_prefix`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLimit {
    pub path_prefix: Cow<'static, str>,
    pub config: RateLimitConfig,
}

impl RouteLimit {
    pub fn new(path_prefix: impl Into<Cow<'static, str>>, config: RateLimitConfig) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            config,
        }
    }

    /// Prefix match on a path segment boundary
    fn matches(&self, path: &str) -> bool {
        let prefix = self.path_prefix.trim_end_matches('/');
        match path.strip_prefix(prefix) {
            Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Request gate configuration
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub thresholds: RiskThresholds,
    /// Budget for each store call on the request path
    pub store_timeout: Duration,
    /// Budget for the risk scorer
    pub risk_timeout: Duration,
    pub flag_cache_ttl: Duration,
    pub writer_capacity: usize,
    /// Emit `X-Risk-Score` / `X-Gate-Required` on allowed responses
    pub debug_headers: bool,
    pub route_limits: Vec<RouteLimit>,
    /// Bearer token for the security admin endpoints; unset disables them
    pub admin_token: Option<String>,
    /// Flag values used when the store has no row or cannot be reached
    pub flag_defaults: FeatureFlagSet,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            thresholds: RiskThresholds::default(),
            store_timeout: Duration::from_millis(250),
            risk_timeout: Duration::from_millis(500),
            flag_cache_ttl: Duration::from_secs(30),
            writer_capacity: DEFAULT_CAPACITY,
            debug_headers: cfg!(debug_assertions),
            route_limits: default_route_limits(),
            admin_token: None,
            flag_defaults: FeatureFlagSet::default(),
        }
    }
}

impl GuardConfig {
    /// Read overrides from the process environment
    pub fn from_env() -> GuardResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GuardResult<Self> {
        let defaults = RiskThresholds::default();
        let medium = parse_score(&lookup, "RISK_THRESHOLD_MEDIUM", defaults.medium)?;
        let high = parse_score(&lookup, "RISK_THRESHOLD_HIGH", defaults.high)?;
        let severe = parse_score(&lookup, "RISK_THRESHOLD_SEVERE", defaults.severe)?;
        let thresholds = RiskThresholds::new(medium, high, severe).ok_or_else(|| {
            GuardError::Configuration(format!(
                "risk thresholds must satisfy medium <= high <= severe <= 100, got {medium}/{high}/{severe}"
            ))
        })?;

        let debug_headers = match lookup("APP_ENV") {
            Some(env) => !env.trim().eq_ignore_ascii_case("production"),
            None => cfg!(debug_assertions),
        };

        let admin_token = lookup("SECURITY_ADMIN_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            thresholds,
            debug_headers,
            admin_token,
            flag_defaults: FeatureFlagSet::from_lookup(&lookup),
            ..Self::default()
        })
    }

    /// Most specific configured limit for `path`
    pub fn route_limit_for(&self, path: &str) -> Option<&RateLimitConfig> {
        self.route_limits
            .iter()
            .filter(|route| route.matches(path))
            .max_by_key(|route| route.path_prefix.len())
            .map(|route| &route.config)
    }

    /// Longest configured window, the horizon for discarding stored hits
    pub fn max_window(&self) -> Duration {
        self.route_limits
            .iter()
            .map(|route| route.config.window)
            .max()
            .unwrap_or_default()
    }
}

fn default_route_limits() -> Vec<RouteLimit> {
    vec![
        RouteLimit::new("/api/auth/login", RateLimitPreset::Login.config()),
        RouteLimit::new("/api/auth/signup", RateLimitPreset::Signup.config()),
        RouteLimit::new("/api/auth/password-reset", RateLimitPreset::PasswordReset.config()),
        RouteLimit::new("/api/contact", RateLimitPreset::ContactForm.config()),
        RouteLimit::new("/api/support", RateLimitPreset::SupportForm.config()),
        RouteLimit::new("/api/search", RateLimitPreset::SearchApi.config()),
        RouteLimit::new("/api", RateLimitPreset::GeneralApi.config()),
    ]
}

fn parse_score(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u8,
) -> GuardResult<u8> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| GuardError::Configuration(format!("{name} must be 0..=100, got {raw:?}"))),
    }
}
