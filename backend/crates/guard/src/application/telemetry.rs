//! Security Telemetry
//!
//! In-memory aggregation of security events plus a best-effort durable copy.
//! Logging an event never blocks on I/O and never fails the caller.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::decision::GateKind;
use crate::domain::events::{SecurityEvent, SecurityEventType};
use crate::infra::writer::BackgroundWriter;

pub const RISK_SCORE_HEADER: HeaderName = HeaderName::from_static("x-risk-score");
pub const GATE_REQUIRED_HEADER: HeaderName = HeaderName::from_static("x-gate-required");

/// Distinct endpoints tracked for block counts
const MAX_TRACKED_ENDPOINTS: usize = 1_000;
/// PoW solve times kept for the average
const SOLVE_TIME_WINDOW: usize = 100;
const TOP_ENDPOINTS: usize = 10;
/// Upper bounds of the low/medium/high buckets; everything above is severe
const RISK_BUCKET_BOUNDS: [u8; 3] = [50, 75, 90];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskDistribution {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub severe: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointBlocks {
    pub endpoint: String,
    pub count: u64,
}

/// Snapshot returned by `get_metrics`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetrics {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub rate_limited_requests: u64,
    pub middleware_errors: u64,
    pub risk_distribution: RiskDistribution,
    pub captcha_attempts: u64,
    /// Successes over attempts, 0 when there were none
    pub captcha_success_rate: f64,
    pub pow_solutions: u64,
    /// Mean of the most recent solve times, 0 when there are none
    pub average_pow_solve_time_ms: f64,
    /// Highest block counts first
    pub top_blocked_endpoints: Vec<EndpointBlocks>,
    /// Durable writes lost to a full queue
    pub dropped_writes: u64,
}

#[derive(Debug)]
struct SolveTimeTracker {
    buffer: VecDeque<u64>,
    capacity: usize,
}

impl SolveTimeTracker {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, solve_time_ms: u64) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(solve_time_ms);
    }

    fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        self.buffer.iter().sum::<u64>() as f64 / self.buffer.len() as f64
    }
}

pub struct SecurityTelemetry {
    writer: BackgroundWriter,
    debug_headers: bool,
    total_requests: AtomicU64,
    blocked_requests: AtomicU64,
    rate_limited: AtomicU64,
    middleware_errors: AtomicU64,
    risk_buckets: [AtomicU64; 4],
    blocked_endpoints: DashMap<String, u64>,
    captcha_attempts: AtomicU64,
    captcha_successes: AtomicU64,
    pow_solutions: AtomicU64,
    solve_times: Mutex<SolveTimeTracker>,
}

impl SecurityTelemetry {
    pub fn new(writer: BackgroundWriter, debug_headers: bool) -> Self {
        Self {
            writer,
            debug_headers,
            total_requests: AtomicU64::new(0),
            blocked_requests: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            middleware_errors: AtomicU64::new(0),
            risk_buckets: Default::default(),
            blocked_endpoints: DashMap::new(),
            captcha_attempts: AtomicU64::new(0),
            captcha_successes: AtomicU64::new(0),
            pow_solutions: AtomicU64::new(0),
            solve_times: Mutex::new(SolveTimeTracker::new(SOLVE_TIME_WINDOW)),
        }
    }

    pub fn log_event(&self, event: SecurityEvent) {
        if event.event_type.is_request_decision() {
            self.total_requests.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(score) = event.risk_score {
            self.risk_buckets[bucket_of(score)].fetch_add(1, Ordering::Relaxed);
        }

        if event.blocked {
            self.blocked_requests.fetch_add(1, Ordering::Relaxed);
            if let Some(endpoint) = &event.endpoint {
                self.count_blocked_endpoint(endpoint);
            }
        }

        match event.event_type {
            SecurityEventType::RateLimited => {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
            }
            SecurityEventType::SecurityMiddlewareError => {
                self.middleware_errors.fetch_add(1, Ordering::Relaxed);
            }
            SecurityEventType::CaptchaAttempt => {
                self.captcha_attempts.fetch_add(1, Ordering::Relaxed);
                if data_flag(&event, "success") {
                    self.captcha_successes.fetch_add(1, Ordering::Relaxed);
                }
            }
            SecurityEventType::PowVerified => {
                self.pow_solutions.fetch_add(1, Ordering::Relaxed);
                if let Some(ms) = event
                    .data
                    .as_ref()
                    .and_then(|d| d.get("solveTimeMs"))
                    .and_then(|v| v.as_u64())
                {
                    self.record_solve_time(ms);
                }
            }
            _ => {}
        }

        tracing::debug!(
            event_type = event.event_type.as_str(),
            blocked = event.blocked,
            risk_score = event.risk_score,
            endpoint = event.endpoint.as_deref(),
            "Security event"
        );

        self.writer.submit_event(event);
    }

    pub fn get_metrics(&self) -> SecurityMetrics {
        let attempts = self.captcha_attempts.load(Ordering::Relaxed);
        let successes = self.captcha_successes.load(Ordering::Relaxed);
        let captcha_success_rate = if attempts == 0 {
            0.0
        } else {
            successes as f64 / attempts as f64
        };

        let average_pow_solve_time_ms = match self.solve_times.lock() {
            Ok(tracker) => tracker.average(),
            Err(poisoned) => poisoned.into_inner().average(),
        };

        let mut top_blocked_endpoints: Vec<EndpointBlocks> = self
            .blocked_endpoints
            .iter()
            .map(|entry| EndpointBlocks {
                endpoint: entry.key().clone(),
                count: *entry.value(),
            })
            .collect();
        top_blocked_endpoints.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.endpoint.cmp(&b.endpoint)));
        top_blocked_endpoints.truncate(TOP_ENDPOINTS);

        let bucket = |i: usize| self.risk_buckets[i].load(Ordering::Relaxed);

        SecurityMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            blocked_requests: self.blocked_requests.load(Ordering::Relaxed),
            rate_limited_requests: self.rate_limited.load(Ordering::Relaxed),
            middleware_errors: self.middleware_errors.load(Ordering::Relaxed),
            risk_distribution: RiskDistribution {
                low: bucket(0),
                medium: bucket(1),
                high: bucket(2),
                severe: bucket(3),
            },
            captcha_attempts: attempts,
            captcha_success_rate,
            pow_solutions: self.pow_solutions.load(Ordering::Relaxed),
            average_pow_solve_time_ms,
            top_blocked_endpoints,
            dropped_writes: self.writer.dropped(),
        }
    }

    /// `X-Risk-Score` / `X-Gate-Required`, empty unless debug headers are on
    pub fn get_debug_headers(&self, risk_score: Option<u8>, gate: Option<GateKind>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !self.debug_headers {
            return headers;
        }
        if let Some(score) = risk_score {
            headers.insert(RISK_SCORE_HEADER, HeaderValue::from(u16::from(score)));
        }
        if let Some(gate) = gate {
            headers.insert(GATE_REQUIRED_HEADER, HeaderValue::from_static(gate.as_str()));
        }
        headers
    }

    fn count_blocked_endpoint(&self, endpoint: &str) {
        if let Some(mut count) = self.blocked_endpoints.get_mut(endpoint) {
            *count += 1;
            return;
        }
        if self.blocked_endpoints.len() >= MAX_TRACKED_ENDPOINTS {
            tracing::debug!(endpoint, "Blocked endpoint table full, not tracking");
            return;
        }
        *self.blocked_endpoints.entry(endpoint.to_string()).or_insert(0) += 1;
    }

    fn record_solve_time(&self, solve_time_ms: u64) {
        match self.solve_times.lock() {
            Ok(mut tracker) => tracker.record(solve_time_ms),
            Err(poisoned) => poisoned.into_inner().record(solve_time_ms),
        }
    }
}

fn bucket_of(score: u8) -> usize {
    RISK_BUCKET_BOUNDS
        .iter()
        .position(|bound| score < *bound)
        .unwrap_or(RISK_BUCKET_BOUNDS.len())
}

fn data_flag(event: &SecurityEvent, key: &str) -> bool {
    event
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_of() {
        assert_eq!(bucket_of(0), 0);
        assert_eq!(bucket_of(49), 0);
        assert_eq!(bucket_of(50), 1);
        assert_eq!(bucket_of(74), 1);
        assert_eq!(bucket_of(75), 2);
        assert_eq!(bucket_of(89), 2);
        assert_eq!(bucket_of(90), 3);
        assert_eq!(bucket_of(100), 3);
    }

    #[test]
    fn test_solve_time_tracker_keeps_latest() {
        let mut tracker = SolveTimeTracker::new(3);
        assert_eq!(tracker.average(), 0.0);
        for ms in [1000, 2000, 3000, 4000] {
            tracker.record(ms);
        }
        assert_eq!(tracker.average(), 3000.0);
    }
}
