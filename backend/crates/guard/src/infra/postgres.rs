//! PostgreSQL Store Implementations

use chrono::Utc;
use platform::rate_limit::{RateLimitStore, StoreError, WindowStats};
use sqlx::PgPool;

use crate::domain::events::{AuditEntry, SecurityEvent};
use crate::domain::flags::FeatureFlag;
use crate::domain::repository::{
    AuditLogRepository, FeatureFlagRepository, FlagRow, RateLimitRetention,
    SecurityEventRepository,
};
use crate::error::GuardResult;

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgGuardRepository {
    pool: PgPool,
}

impl PgGuardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RateLimitRetention for PgGuardRepository {
    async fn cleanup_expired(&self, max_window_ms: i64) -> GuardResult<u64> {
        let cutoff = Utc::now().timestamp_millis() - max_window_ms;

        let deleted = sqlx::query("DELETE FROM rate_limit_tracking WHERE last_request_ms < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!(rate_limit_rows = deleted, "Cleaned up expired rate limit data");

        Ok(deleted)
    }
}

impl RateLimitStore for PgGuardRepository {
    async fn window_stats(
        &self,
        identifier: &str,
        route_key: &str,
        since_ms: i64,
        failures_only: bool,
    ) -> Result<WindowStats, StoreError> {
        let row = sqlx::query_as::<_, WindowRow>(
            r#"
            SELECT
                COALESCE(SUM(request_count), 0)::BIGINT AS count,
                MIN(window_start_ms) AS oldest_ms
            FROM rate_limit_tracking
            WHERE identifier = $1
              AND endpoint = $2
              AND last_request_ms >= $3
              AND (NOT $4 OR success = FALSE)
            "#,
        )
        .bind(identifier)
        .bind(route_key)
        .bind(since_ms)
        .bind(failures_only)
        .fetch_one(&self.pool)
        .await?;

        Ok(WindowStats {
            count: u32::try_from(row.count).unwrap_or(u32::MAX),
            oldest_ms: row.oldest_ms,
        })
    }

    async fn record(
        &self,
        identifier: &str,
        route_key: &str,
        at_ms: i64,
        success: bool,
    ) -> Result<(), StoreError> {
        // One row per request: concurrent inserts never race on a counter
        sqlx::query(
            r#"
            INSERT INTO rate_limit_tracking (
                identifier,
                endpoint,
                window_start_ms,
                last_request_ms,
                request_count,
                success
            ) VALUES ($1, $2, $3, $3, 1, $4)
            "#,
        )
        .bind(identifier)
        .bind(route_key)
        .bind(at_ms)
        .bind(success)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl FeatureFlagRepository for PgGuardRepository {
    async fn load_all(&self) -> GuardResult<Vec<FlagRow>> {
        let rows = sqlx::query_as::<_, FlagRecord>("SELECT name, enabled FROM feature_flags")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| FlagRow {
                name: r.name,
                enabled: r.enabled,
            })
            .collect())
    }

    async fn upsert(&self, flag: FeatureFlag, enabled: bool, updated_by: &str) -> GuardResult<()> {
        sqlx::query(
            r#"
            INSERT INTO feature_flags (name, enabled, description, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (name) DO UPDATE
            SET enabled = EXCLUDED.enabled,
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            "#,
        )
        .bind(flag.name())
        .bind(enabled)
        .bind(flag.description())
        .bind(updated_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_if_absent(
        &self,
        flag: FeatureFlag,
        enabled: bool,
        description: &str,
    ) -> GuardResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO feature_flags (name, enabled, description, updated_by, updated_at)
            VALUES ($1, $2, $3, 'system', NOW())
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(flag.name())
        .bind(enabled)
        .bind(description)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted > 0)
    }
}

impl SecurityEventRepository for PgGuardRepository {
    async fn insert_event(&self, event: &SecurityEvent) -> GuardResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_events (
                event_type,
                ip,
                user_id,
                user_agent,
                endpoint,
                data,
                blocked,
                risk_score,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.event_type.as_str())
        .bind(event.ip.map(|ip| ip.to_string()))
        .bind(event.user_id.as_deref())
        .bind(event.user_agent.as_deref())
        .bind(event.endpoint.as_deref())
        .bind(event.data.as_ref().map(sqlx::types::Json))
        .bind(event.blocked)
        .bind(event.risk_score.map(i16::from))
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl AuditLogRepository for PgGuardRepository {
    async fn append(&self, entry: &AuditEntry) -> GuardResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (actor, action, target, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.target)
        .bind(sqlx::types::Json(&entry.metadata))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct WindowRow {
    count: i64,
    oldest_ms: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct FlagRecord {
    name: String,
    enabled: bool,
}
