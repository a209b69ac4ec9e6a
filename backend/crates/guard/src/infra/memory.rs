//! In-memory Store Implementations
//!
//! Used when no database is reachable and in tests. State is per process.

use chrono::Utc;
use dashmap::DashMap;
use platform::rate_limit::{RateLimitPreset, RateLimitStore, SlidingWindow, StoreError, WindowStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::events::{AuditEntry, SecurityEvent};
use crate::domain::flags::FeatureFlag;
use crate::domain::repository::{
    AuditLogRepository, FeatureFlagRepository, FlagRow, RateLimitRetention,
    SecurityEventRepository,
};
use crate::error::GuardResult;

#[derive(Clone)]
pub struct MemoryGuardRepository {
    hits: Arc<SlidingWindow>,
    /// Hits older than this are never counted by any route
    retention_ms: i64,
    flags: Arc<DashMap<String, bool>>,
    events: Arc<Mutex<Vec<SecurityEvent>>>,
    audit: Arc<Mutex<Vec<AuditEntry>>>,
}

impl Default for MemoryGuardRepository {
    fn default() -> Self {
        let retention = RateLimitPreset::ALL
            .iter()
            .map(|preset| preset.config().window)
            .max()
            .unwrap_or_default();

        Self {
            hits: Arc::default(),
            retention_ms: retention.as_millis() as i64,
            flags: Arc::default(),
            events: Arc::default(),
            audit: Arc::default(),
        }
    }
}

impl MemoryGuardRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep hits for `retention`, which must cover the longest route window
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention_ms: retention.as_millis() as i64,
            ..Self::default()
        }
    }

    /// Number of `identifier:route_key` entries holding hits
    pub fn tracked_keys(&self) -> usize {
        self.hits.len()
    }

    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().await.clone()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().await.clone()
    }

    pub fn stored_flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).map(|v| *v)
    }
}

impl RateLimitStore for MemoryGuardRepository {
    async fn window_stats(
        &self,
        identifier: &str,
        route_key: &str,
        since_ms: i64,
        failures_only: bool,
    ) -> Result<WindowStats, StoreError> {
        Ok(self
            .hits
            .stats(&SlidingWindow::key(identifier, route_key), since_ms, failures_only))
    }

    async fn record(
        &self,
        identifier: &str,
        route_key: &str,
        at_ms: i64,
        success: bool,
    ) -> Result<(), StoreError> {
        self.hits.record(
            &SlidingWindow::key(identifier, route_key),
            at_ms,
            success,
            at_ms - self.retention_ms,
        );
        Ok(())
    }
}

impl RateLimitRetention for MemoryGuardRepository {
    async fn cleanup_expired(&self, max_window_ms: i64) -> GuardResult<u64> {
        let since_ms = Utc::now().timestamp_millis() - max_window_ms.max(0);
        Ok(self.hits.sweep(since_ms) as u64)
    }
}

impl FeatureFlagRepository for MemoryGuardRepository {
    async fn load_all(&self) -> GuardResult<Vec<FlagRow>> {
        Ok(self
            .flags
            .iter()
            .map(|entry| FlagRow {
                name: entry.key().clone(),
                enabled: *entry.value(),
            })
            .collect())
    }

    async fn upsert(&self, flag: FeatureFlag, enabled: bool, _updated_by: &str) -> GuardResult<()> {
        self.flags.insert(flag.name().to_string(), enabled);
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        flag: FeatureFlag,
        enabled: bool,
        _description: &str,
    ) -> GuardResult<bool> {
        let mut inserted = false;
        self.flags.entry(flag.name().to_string()).or_insert_with(|| {
            inserted = true;
            enabled
        });
        Ok(inserted)
    }
}

impl SecurityEventRepository for MemoryGuardRepository {
    async fn insert_event(&self, event: &SecurityEvent) -> GuardResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

impl AuditLogRepository for MemoryGuardRepository {
    async fn append(&self, entry: &AuditEntry) -> GuardResult<()> {
        self.audit.lock().await.push(entry.clone());
        Ok(())
    }
}
