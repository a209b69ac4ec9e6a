//! Unit tests for the guard crate

#[cfg(test)]
mod support {
    use platform::rate_limit::{RateLimitStore, StoreError, WindowStats};
    use pow::MemoryPowRepository;
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::application::config::GuardConfig;
    use crate::application::feature_flags::FeatureFlagsManager;
    use crate::application::security_check::SecurityMiddleware;
    use crate::application::telemetry::SecurityTelemetry;
    use crate::domain::collaborators::{CaptchaVerifier, RiskAssessment, RiskScorer};
    use crate::domain::events::{AuditEntry, SecurityEvent};
    use crate::domain::flags::FeatureFlag;
    use crate::domain::repository::{
        AuditLogRepository, FeatureFlagRepository, FlagRow, SecurityEventRepository,
    };
    use crate::error::{GuardError, GuardResult};
    use crate::infra::memory::MemoryGuardRepository;
    use crate::infra::writer::BackgroundWriter;

    pub type Gate<R> = SecurityMiddleware<MemoryGuardRepository, MemoryPowRepository, R, TokenCaptcha>;

    pub struct Harness<R>
    where
        R: RiskScorer + Send + Sync + 'static,
    {
        pub store: Arc<MemoryGuardRepository>,
        pub pow_store: Arc<MemoryPowRepository>,
        pub gate: Arc<Gate<R>>,
    }

    pub fn harness<R>(scorer: R, config: GuardConfig) -> Harness<R>
    where
        R: RiskScorer + Send + Sync + 'static,
    {
        let store = Arc::new(MemoryGuardRepository::new());
        let pow_store = Arc::new(MemoryPowRepository::new());
        let (writer, _) = BackgroundWriter::spawn(store.clone(), 64, Duration::from_millis(250));
        let config = Arc::new(config);

        let flags = Arc::new(FeatureFlagsManager::new(
            store.clone(),
            writer.clone(),
            config.flag_defaults,
            config.flag_cache_ttl,
            config.store_timeout,
        ));
        let telemetry = Arc::new(SecurityTelemetry::new(writer, config.debug_headers));

        let gate = Arc::new(SecurityMiddleware::new(
            config,
            store.clone(),
            pow_store.clone(),
            flags,
            telemetry,
            Arc::new(scorer),
            Arc::new(TokenCaptcha),
        ));

        Harness {
            store,
            pow_store,
            gate,
        }
    }

    pub fn test_config() -> GuardConfig {
        GuardConfig {
            debug_headers: true,
            route_limits: Vec::new(),
            ..GuardConfig::default()
        }
    }

    /// Poll the durable copy until `n` events arrived
    pub async fn wait_for_events(store: &MemoryGuardRepository, n: usize) -> Vec<SecurityEvent> {
        for _ in 0..100 {
            let events = store.events().await;
            if events.len() >= n {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store.events().await
    }

    pub async fn wait_for_audit(store: &MemoryGuardRepository, n: usize) -> Vec<AuditEntry> {
        for _ in 0..100 {
            let entries = store.audit_entries().await;
            if entries.len() >= n {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store.audit_entries().await
    }

    /// Accepts exactly the token `pass`
    pub struct TokenCaptcha;

    impl CaptchaVerifier for TokenCaptcha {
        async fn verify(&self, token: &str, _ip: IpAddr) -> GuardResult<bool> {
            Ok(token == "pass")
        }
    }

    pub struct FailingScorer;

    impl RiskScorer for FailingScorer {
        async fn calculate_risk(
            &self,
            _ip: IpAddr,
            _user_id: Option<&str>,
            _user_agent: &str,
            _path: &str,
        ) -> GuardResult<RiskAssessment> {
            Err(GuardError::RiskScorer("model unavailable".into()))
        }
    }

    pub struct SlowScorer(pub Duration);

    impl RiskScorer for SlowScorer {
        async fn calculate_risk(
            &self,
            _ip: IpAddr,
            _user_id: Option<&str>,
            _user_agent: &str,
            _path: &str,
        ) -> GuardResult<RiskAssessment> {
            tokio::time::sleep(self.0).await;
            Ok(RiskAssessment::new(0))
        }
    }

    /// Store whose every call fails
    pub struct FailingStore;

    impl RateLimitStore for FailingStore {
        async fn window_stats(
            &self,
            _identifier: &str,
            _route_key: &str,
            _since_ms: i64,
            _failures_only: bool,
        ) -> Result<WindowStats, StoreError> {
            Err("connection refused".into())
        }

        async fn record(
            &self,
            _identifier: &str,
            _route_key: &str,
            _at_ms: i64,
            _success: bool,
        ) -> Result<(), StoreError> {
            Err("connection refused".into())
        }
    }

    impl FeatureFlagRepository for FailingStore {
        async fn load_all(&self) -> GuardResult<Vec<FlagRow>> {
            Err(GuardError::Store("connection refused".into()))
        }

        async fn upsert(&self, _flag: FeatureFlag, _enabled: bool, _updated_by: &str) -> GuardResult<()> {
            Err(GuardError::Store("connection refused".into()))
        }

        async fn insert_if_absent(
            &self,
            _flag: FeatureFlag,
            _enabled: bool,
            _description: &str,
        ) -> GuardResult<bool> {
            Err(GuardError::Store("connection refused".into()))
        }
    }

    impl SecurityEventRepository for FailingStore {
        async fn insert_event(&self, _event: &SecurityEvent) -> GuardResult<()> {
            Err(GuardError::Store("connection refused".into()))
        }
    }

    impl AuditLogRepository for FailingStore {
        async fn append(&self, _entry: &AuditEntry) -> GuardResult<()> {
            Err(GuardError::Store("connection refused".into()))
        }
    }

    /// Store that never answers in time
    pub struct StalledStore;

    impl RateLimitStore for StalledStore {
        async fn window_stats(
            &self,
            _identifier: &str,
            _route_key: &str,
            _since_ms: i64,
            _failures_only: bool,
        ) -> Result<WindowStats, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(WindowStats::default())
        }

        async fn record(
            &self,
            _identifier: &str,
            _route_key: &str,
            _at_ms: i64,
            _success: bool,
        ) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    impl SecurityEventRepository for StalledStore {
        async fn insert_event(&self, _event: &SecurityEvent) -> GuardResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    impl AuditLogRepository for StalledStore {
        async fn append(&self, _entry: &AuditEntry) -> GuardResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod rate_limiter_tests {
    use chrono::Utc;
    use platform::rate_limit::{RateLimitConfig, RateLimitStore};
    use std::sync::Arc;
    use std::time::Duration;

    use super::support::{FailingStore, StalledStore};
    use crate::application::rate_limiter::{RateLimiter, SWEEP_EVERY};
    use crate::domain::repository::RateLimitRetention;
    use crate::infra::memory::MemoryGuardRepository;

    const TIMEOUT: Duration = Duration::from_millis(250);

    #[tokio::test]
    async fn test_window_denies_then_recovers() {
        let limiter = RateLimiter::new(Arc::new(MemoryGuardRepository::new()), TIMEOUT);
        let config = RateLimitConfig::new("test", 5, Duration::from_millis(1000));

        for i in 0..5u32 {
            let result = limiter.check_limit("10.0.0.1", &config).await;
            assert!(result.allowed, "request {i} should pass");
            assert_eq!(result.remaining, 5 - i);
            assert_eq!(result.retry_after, None);
            limiter.record_request("10.0.0.1", &config, true).await;
        }

        let denied = limiter.check_limit("10.0.0.1", &config).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after.is_some_and(|s| s > 0));

        // Other identifiers are unaffected
        assert!(limiter.check_limit("10.0.0.2", &config).await.allowed);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let result = limiter.check_limit("10.0.0.1", &config).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 5);
        assert!(!limiter.is_degraded());
    }

    #[tokio::test]
    async fn test_failing_store_falls_back_to_local_window() {
        let limiter = RateLimiter::new(Arc::new(FailingStore), TIMEOUT);
        let config = RateLimitConfig::new("test", 2, Duration::from_secs(60));

        for _ in 0..2 {
            assert!(limiter.check_limit("u1", &config).await.allowed);
            limiter.record_request("u1", &config, true).await;
        }

        let denied = limiter.check_limit("u1", &config).await;
        assert!(!denied.allowed);
        assert!(denied.retry_after.is_some());
        assert!(limiter.is_degraded());
    }

    #[tokio::test]
    async fn test_store_timeout_falls_back_to_local_window() {
        let limiter = RateLimiter::new(Arc::new(StalledStore), Duration::from_millis(20));
        let config = RateLimitConfig::new("test", 1, Duration::from_secs(60));

        assert!(limiter.check_limit("u1", &config).await.allowed);
        limiter.record_request("u1", &config, false).await;
        assert!(!limiter.check_limit("u1", &config).await.allowed);
        assert!(limiter.is_degraded());
    }

    #[tokio::test]
    async fn test_skip_if_successful_counts_failures_only() {
        let limiter = RateLimiter::new(Arc::new(MemoryGuardRepository::new()), TIMEOUT);
        let config = RateLimitConfig::new("login", 2, Duration::from_secs(60)).skip_if_successful();

        for _ in 0..5 {
            limiter.record_request("alice", &config, true).await;
        }
        assert!(limiter.check_limit("alice", &config).await.allowed);

        limiter.record_request("alice", &config, false).await;
        let result = limiter.check_limit("alice", &config).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);

        limiter.record_request("alice", &config, false).await;
        assert!(!limiter.check_limit("alice", &config).await.allowed);
    }

    #[tokio::test]
    async fn test_idle_local_keys_are_swept() {
        let limiter = RateLimiter::new(Arc::new(MemoryGuardRepository::new()), TIMEOUT);
        let config = RateLimitConfig::new("burst", 5, Duration::from_millis(10));

        for i in 0..2_000u32 {
            let ip = format!("10.{}.{}.1", i / 256, i % 256);
            assert!(limiter.check_limit(&ip, &config).await.allowed);
            limiter.record_request(&ip, &config, true).await;
        }
        assert!(limiter.local_keys() > 0);

        tokio::time::sleep(Duration::from_millis(50)).await;

        // Recording alone keeps the local window bounded
        for _ in 0..SWEEP_EVERY {
            limiter.record_request("10.250.0.1", &config, false).await;
        }
        assert_eq!(limiter.local_keys(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.sweep_local(), 1);
        assert_eq!(limiter.local_keys(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_prunes_to_retention() {
        let store = MemoryGuardRepository::with_retention(Duration::from_millis(10));

        store.record("a", "r", 1_000, false).await.unwrap();
        store.record("a", "r", 2_000, false).await.unwrap();
        let stats = store.window_stats("a", "r", 0, false).await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.oldest_ms, Some(2_000));

        let now_ms = Utc::now().timestamp_millis();
        store.record("b", "r", now_ms, true).await.unwrap();
        assert_eq!(store.tracked_keys(), 2);

        assert_eq!(store.cleanup_expired(60_000).await.unwrap(), 1);
        assert_eq!(store.tracked_keys(), 1);
        assert_eq!(store.window_stats("b", "r", now_ms - 1, false).await.unwrap().count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_are_not_lost() {
        const TASKS: usize = 8;
        const PER_TASK: usize = 50;

        let store = Arc::new(MemoryGuardRepository::new());
        let now_ms = Utc::now().timestamp_millis();
        let handles: Vec<_> = (0..TASKS)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..PER_TASK {
                        store.record("1.2.3.4", "login", now_ms, false).await.unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        let stats = store.window_stats("1.2.3.4", "login", now_ms - 1, false).await.unwrap();
        assert_eq!(stats.count as usize, TASKS * PER_TASK);

        // Same through the process-local fallback
        let limiter = Arc::new(RateLimiter::new(Arc::new(FailingStore), TIMEOUT));
        let config = RateLimitConfig::new("login", 1_000, Duration::from_secs(60));
        let handles: Vec<_> = (0..TASKS)
            .map(|_| {
                let limiter = limiter.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    for _ in 0..PER_TASK {
                        limiter.record_request("1.2.3.4", &config, false).await;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        let result = limiter.check_limit("1.2.3.4", &config).await;
        assert!(limiter.is_degraded());
        assert_eq!(result.remaining as usize, 1_000 - TASKS * PER_TASK);
    }
}

#[cfg(test)]
mod maintenance_tests {
    use chrono::Utc;
    use platform::rate_limit::{RateLimitConfig, RateLimitStore};
    use pow::domain::repository::{ChallengeRepository, WorkTokenRepository};
    use pow::{Difficulty, PowConfig, ProofOfWork};
    use std::sync::Arc;
    use std::time::Duration;

    use super::support::{harness, test_config};
    use crate::application::config::{GuardConfig, RouteLimit};
    use crate::application::maintenance::{Maintenance, SweepReport};
    use crate::domain::collaborators::StaticRiskScorer;

    #[tokio::test]
    async fn test_sweep_removes_expired_data() {
        let config = GuardConfig {
            route_limits: vec![RouteLimit::new(
                "/api",
                RateLimitConfig::new("api", 100, Duration::from_secs(60)),
            )],
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(0), config);
        let now_ms = Utc::now().timestamp_millis();

        h.store.record("stale", "api", now_ms - 120_000, false).await.unwrap();
        h.store.record("fresh", "api", now_ms, false).await.unwrap();

        let pow = ProofOfWork::new(Arc::new(PowConfig::default()));
        let mut expired = pow.generate_challenge(Difficulty::new(4).unwrap());
        expired.expires_at_ms = 0;
        ChallengeRepository::create(h.pow_store.as_ref(), &expired).await.unwrap();
        let live = pow.generate_challenge(Difficulty::new(4).unwrap());
        ChallengeRepository::create(h.pow_store.as_ref(), &live).await.unwrap();
        WorkTokenRepository::create(h.pow_store.as_ref(), "old-digest", 1).await.unwrap();

        let blip = RateLimitConfig::new("blip", 5, Duration::from_millis(10));
        h.gate.rate_limiter().record_request("9.9.9.9", &blip, true).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let maintenance = Maintenance::new(h.gate.clone(), h.store.clone(), h.pow_store.clone());
        let report = maintenance.sweep().await;
        assert_eq!(
            report,
            SweepReport {
                rate_limit_entries: 1,
                local_keys: 1,
                challenges: 1,
                work_tokens: 1,
            }
        );
        assert_eq!(h.store.tracked_keys(), 2);
        assert_eq!(h.pow_store.stored(), (1, 0));

        assert_eq!(maintenance.sweep().await, SweepReport::default());
    }
}

#[cfg(test)]
mod feature_flag_tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::support::{FailingStore, wait_for_audit};
    use crate::application::feature_flags::FeatureFlagsManager;
    use crate::domain::flags::{FeatureFlag, FeatureFlagSet};
    use crate::domain::repository::{FeatureFlagRepository, FlagRow};
    use crate::error::GuardResult;
    use crate::infra::memory::MemoryGuardRepository;
    use crate::infra::writer::BackgroundWriter;

    const TTL: Duration = Duration::from_secs(30);
    const TIMEOUT: Duration = Duration::from_millis(250);

    /// Memory store that counts full reads
    #[derive(Default)]
    struct CountingFlags {
        inner: MemoryGuardRepository,
        loads: AtomicUsize,
    }

    impl CountingFlags {
        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl FeatureFlagRepository for CountingFlags {
        async fn load_all(&self) -> GuardResult<Vec<FlagRow>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            FeatureFlagRepository::load_all(&self.inner).await
        }

        async fn upsert(&self, flag: FeatureFlag, enabled: bool, updated_by: &str) -> GuardResult<()> {
            FeatureFlagRepository::upsert(&self.inner, flag, enabled, updated_by).await
        }

        async fn insert_if_absent(
            &self,
            flag: FeatureFlag,
            enabled: bool,
            description: &str,
        ) -> GuardResult<bool> {
            FeatureFlagRepository::insert_if_absent(&self.inner, flag, enabled, description).await
        }
    }

    fn manager<R: FeatureFlagRepository>(
        repo: Arc<R>,
        audit: Arc<MemoryGuardRepository>,
        defaults: FeatureFlagSet,
    ) -> FeatureFlagsManager<R> {
        let (writer, _) = BackgroundWriter::spawn(audit, 16, TIMEOUT);
        FeatureFlagsManager::new(repo, writer, defaults, TTL, TIMEOUT)
    }

    #[tokio::test]
    async fn test_reads_are_cached() {
        let repo = Arc::new(CountingFlags::default());
        let flags = manager(repo.clone(), Arc::default(), FeatureFlagSet::default());

        assert_eq!(flags.get_flags().await, FeatureFlagSet::default());
        assert!(!flags.get_flag(FeatureFlag::UnderAttack).await);
        assert_eq!(flags.get_flags().await, FeatureFlagSet::default());
        assert_eq!(repo.loads(), 1);
    }

    #[tokio::test]
    async fn test_set_flag_is_visible_immediately_and_audited() {
        let repo = Arc::new(CountingFlags::default());
        let audit = Arc::new(MemoryGuardRepository::new());
        let flags = manager(repo.clone(), audit.clone(), FeatureFlagSet::default());

        assert!(!flags.get_flag(FeatureFlag::UnderAttack).await);
        assert!(flags.set_flag(FeatureFlag::UnderAttack, true, Some("ops")).await);
        assert!(flags.get_flag(FeatureFlag::UnderAttack).await);
        assert_eq!(repo.loads(), 2);

        let entries = wait_for_audit(&audit, 1).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor, "ops");
        assert_eq!(entries[0].action, "feature_flag.update");
        assert_eq!(entries[0].target, "UNDER_ATTACK");
        assert_eq!(entries[0].metadata["new_value"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let repo = Arc::new(CountingFlags::default());
        let flags = manager(repo.clone(), Arc::default(), FeatureFlagSet::default());

        flags.get_flags().await;
        tokio::time::advance(Duration::from_secs(29)).await;
        flags.get_flags().await;
        assert_eq!(repo.loads(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        flags.get_flags().await;
        assert_eq!(repo.loads(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_uses_defaults() {
        let defaults = FeatureFlagSet::default().with(FeatureFlag::UnderAttack, true);
        let flags = manager(Arc::new(FailingStore), Arc::default(), defaults);

        assert_eq!(flags.get_flags().await, defaults);
        assert!(flags.get_flag(FeatureFlag::UnderAttack).await);
        assert!(!flags.set_flag(FeatureFlag::ReadOnlyMode, true, None).await);
        assert!(flags.initialize_flags().await.is_err());
    }

    #[tokio::test]
    async fn test_stored_values_override_defaults() {
        let repo = Arc::new(MemoryGuardRepository::new());
        FeatureFlagRepository::upsert(repo.as_ref(), FeatureFlag::CaptchaAlwaysOn, true, "test")
            .await
            .unwrap();
        let defaults = FeatureFlagSet::default().with(FeatureFlag::MaintenanceMode, true);
        let flags = manager(repo, Arc::default(), defaults);

        let set = flags.get_flags().await;
        assert!(set.captcha_always_on);
        assert!(set.maintenance_mode);
        assert!(!set.under_attack);
    }

    #[tokio::test]
    async fn test_initialize_flags_is_idempotent() {
        let repo = Arc::new(MemoryGuardRepository::new());
        let defaults = FeatureFlagSet::default().with(FeatureFlag::PowEnforceHighRisk, true);
        let flags = manager(repo.clone(), Arc::default(), defaults);

        assert_eq!(flags.initialize_flags().await.unwrap(), FeatureFlag::ALL.len());
        assert_eq!(flags.initialize_flags().await.unwrap(), 0);
        assert_eq!(repo.stored_flag("POW_ENFORCE_HIGH_RISK"), Some(true));
        assert_eq!(repo.stored_flag("UNDER_ATTACK"), Some(false));

        // An operator's value survives re-initialization
        assert!(flags.set_flag(FeatureFlag::UnderAttack, true, None).await);
        flags.initialize_flags().await.unwrap();
        assert!(flags.get_flag(FeatureFlag::UnderAttack).await);
    }
}

#[cfg(test)]
mod telemetry_tests {
    use axum::http::HeaderValue;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    use super::support::{StalledStore, wait_for_events};
    use crate::application::telemetry::SecurityTelemetry;
    use crate::domain::decision::GateKind;
    use crate::domain::events::{SecurityEvent, SecurityEventType};
    use crate::infra::memory::MemoryGuardRepository;
    use crate::infra::writer::BackgroundWriter;

    fn telemetry(store: Arc<MemoryGuardRepository>, debug_headers: bool) -> SecurityTelemetry {
        let (writer, _) = BackgroundWriter::spawn(store, 256, Duration::from_millis(250));
        SecurityTelemetry::new(writer, debug_headers)
    }

    fn decision(score: u8, blocked: bool, endpoint: &str) -> SecurityEvent {
        let event_type = if blocked {
            SecurityEventType::RequestBlocked
        } else {
            SecurityEventType::RequestAllowed
        };
        SecurityEvent::new(event_type)
            .risk_score(Some(score))
            .blocked(blocked)
            .endpoint(endpoint)
    }

    #[tokio::test]
    async fn test_metrics_aggregate_events() {
        let store = Arc::new(MemoryGuardRepository::new());
        let telemetry = telemetry(store.clone(), false);

        telemetry.log_event(decision(10, false, "/a"));
        telemetry.log_event(decision(60, false, "/a"));
        telemetry.log_event(decision(80, false, "/b"));
        telemetry.log_event(decision(95, true, "/b"));
        telemetry.log_event(
            SecurityEvent::new(SecurityEventType::RateLimited)
                .blocked(true)
                .endpoint("/b"),
        );
        for success in [true, false] {
            telemetry.log_event(
                SecurityEvent::new(SecurityEventType::CaptchaAttempt).data(json!({ "success": success })),
            );
        }
        for ms in [1000, 3000] {
            telemetry.log_event(
                SecurityEvent::new(SecurityEventType::PowVerified).data(json!({ "solveTimeMs": ms })),
            );
        }

        let metrics = telemetry.get_metrics();
        assert_eq!(metrics.total_requests, 5);
        assert_eq!(metrics.blocked_requests, 2);
        assert_eq!(metrics.rate_limited_requests, 1);
        assert_eq!(metrics.risk_distribution.low, 1);
        assert_eq!(metrics.risk_distribution.medium, 1);
        assert_eq!(metrics.risk_distribution.high, 1);
        assert_eq!(metrics.risk_distribution.severe, 1);
        assert_eq!(metrics.captcha_attempts, 2);
        assert_eq!(metrics.captcha_success_rate, 0.5);
        assert_eq!(metrics.pow_solutions, 2);
        assert_eq!(metrics.average_pow_solve_time_ms, 2000.0);
        assert_eq!(metrics.top_blocked_endpoints.len(), 1);
        assert_eq!(metrics.top_blocked_endpoints[0].endpoint, "/b");
        assert_eq!(metrics.top_blocked_endpoints[0].count, 2);

        assert_eq!(wait_for_events(&store, 9).await.len(), 9);
    }

    #[tokio::test]
    async fn test_empty_metrics() {
        let metrics = telemetry(Arc::default(), false).get_metrics();
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.captcha_success_rate, 0.0);
        assert_eq!(metrics.average_pow_solve_time_ms, 0.0);
        assert!(metrics.top_blocked_endpoints.is_empty());

        let json = serde_json::to_value(&metrics).unwrap();
        assert!(json.get("captchaSuccessRate").is_some());
        assert!(json.get("topBlockedEndpoints").is_some());
    }

    #[tokio::test]
    async fn test_top_blocked_endpoints_sorted_and_capped() {
        let telemetry = telemetry(Arc::default(), false);
        for i in 0..12u64 {
            for _ in 0..=i {
                telemetry.log_event(decision(95, true, &format!("/e{i}")));
            }
        }

        let top = telemetry.get_metrics().top_blocked_endpoints;
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].endpoint, "/e11");
        assert_eq!(top[0].count, 12);
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[tokio::test]
    async fn test_debug_headers() {
        let on = telemetry(Arc::default(), true);
        let headers = on.get_debug_headers(Some(42), Some(GateKind::Pow));
        assert_eq!(headers.get("x-risk-score"), Some(&HeaderValue::from_static("42")));
        assert_eq!(headers.get("x-gate-required"), Some(&HeaderValue::from_static("pow")));
        assert_eq!(on.get_debug_headers(None, None).len(), 0);

        let off = telemetry(Arc::default(), false);
        assert!(off.get_debug_headers(Some(42), Some(GateKind::Captcha)).is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_writes() {
        let (writer, _) = BackgroundWriter::spawn(Arc::new(StalledStore), 1, Duration::from_secs(3600));
        let telemetry = SecurityTelemetry::new(writer, false);

        for _ in 0..5 {
            telemetry.log_event(decision(10, false, "/a"));
        }

        // Aggregation is unaffected by dropped durable copies
        let metrics = telemetry.get_metrics();
        assert_eq!(metrics.total_requests, 5);
        assert!(metrics.dropped_writes >= 3);
    }
}

#[cfg(test)]
mod security_check_tests {
    use axum::http::{HeaderMap, HeaderValue, Method};
    use chrono::Utc;
    use platform::rate_limit::RateLimitConfig;
    use pow::domain::entities::token_digest;
    use pow::domain::repository::WorkTokenRepository;
    use std::time::Duration;

    use super::support::{FailingScorer, SlowScorer, harness, test_config, wait_for_events};
    use crate::application::config::{GuardConfig, RouteLimit};
    use crate::application::security_check::RequestContext;
    use crate::domain::collaborators::StaticRiskScorer;
    use crate::domain::decision::{CheckReason, GateKind, RiskThresholds};
    use crate::domain::events::SecurityEventType;
    use crate::domain::flags::FeatureFlag;

    const WORK_TOKEN: &str = "0123456789abcdef0123456789abcdef.fedcba9876543210fedcba9876543210";

    fn request(path: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("user-agent", HeaderValue::from_static("test-agent"));
        RequestContext::new(Method::GET, path, headers)
    }

    fn with_header(mut ctx: RequestContext, name: &'static str, value: &'static str) -> RequestContext {
        ctx.headers.insert(name, HeaderValue::from_static(value));
        ctx
    }

    #[tokio::test]
    async fn test_policy_table() {
        let cases = [
            (40, None, None, true),
            (60, Some(GateKind::Captcha), Some(CheckReason::ElevatedRisk), false),
            (80, Some(GateKind::Pow), Some(CheckReason::ElevatedRisk), false),
            (95, None, Some(CheckReason::SevereRisk), false),
        ];

        for (score, gate, reason, allowed) in cases {
            let h = harness(StaticRiskScorer::new(score), test_config());
            assert!(h.gate.flags().set_flag(FeatureFlag::PowEnforceHighRisk, true, None).await);

            let result = h.gate.check(&request("/protected")).await;
            assert_eq!(result.allowed, allowed, "score {score}");
            assert_eq!(result.gate_required, gate, "score {score}");
            assert_eq!(result.reason, reason, "score {score}");
            assert_eq!(result.risk_score, Some(score));
        }
    }

    #[tokio::test]
    async fn test_under_attack_mode() {
        let h = harness(StaticRiskScorer::new(55), test_config());
        assert!(h.gate.flags().set_flag(FeatureFlag::UnderAttack, true, None).await);
        let result = h.gate.check(&request("/protected")).await;
        assert_eq!(result.gate_required, Some(GateKind::Captcha));
        assert_eq!(result.reason, Some(CheckReason::UnderAttack));

        let h = harness(StaticRiskScorer::new(95), test_config());
        assert!(h.gate.flags().set_flag(FeatureFlag::UnderAttack, true, None).await);
        let result = h.gate.check(&request("/protected")).await;
        assert!(result.is_blocked());
        assert_eq!(result.reason, Some(CheckReason::SevereRisk));

        let h = harness(StaticRiskScorer::new(20), test_config());
        assert!(h.gate.flags().set_flag(FeatureFlag::UnderAttack, true, None).await);
        assert!(h.gate.check(&request("/protected")).await.allowed);
    }

    #[tokio::test]
    async fn test_captcha_always_on() {
        let h = harness(StaticRiskScorer::new(0), test_config());
        assert!(h.gate.flags().set_flag(FeatureFlag::CaptchaAlwaysOn, true, None).await);

        let result = h.gate.check(&request("/protected")).await;
        assert_eq!(result.gate_required, Some(GateKind::Captcha));
        assert_eq!(result.reason, Some(CheckReason::CaptchaAlwaysOn));
    }

    #[tokio::test]
    async fn test_custom_thresholds() {
        let config = GuardConfig {
            thresholds: RiskThresholds::new(20, 30, 40).unwrap(),
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(45), config);
        assert!(h.gate.check(&request("/protected")).await.is_blocked());
    }

    #[tokio::test]
    async fn test_fail_open_on_scorer_error() {
        let h = harness(FailingScorer, test_config());

        let result = h.gate.check(&request("/protected")).await;
        assert!(result.allowed);
        assert_eq!(result.reason, Some(CheckReason::FailOpen));
        assert_eq!(result.gate_required, None);

        let metrics = h.gate.telemetry().get_metrics();
        assert_eq!(metrics.middleware_errors, 1);
        assert_eq!(metrics.total_requests, 1);

        let events = wait_for_events(&h.store, 1).await;
        let error = events
            .iter()
            .find(|e| e.event_type == SecurityEventType::SecurityMiddlewareError)
            .expect("middleware error event");
        assert_eq!(error.ip, Some("203.0.113.7".parse().unwrap()));
        assert_eq!(error.endpoint.as_deref(), Some("/protected"));
        assert!(error.data.as_ref().unwrap()["error"].as_str().unwrap().contains("model unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_open_on_scorer_timeout() {
        let h = harness(SlowScorer(Duration::from_secs(10)), test_config());

        let result = h.gate.check(&request("/protected")).await;
        assert!(result.allowed);
        assert_eq!(result.reason, Some(CheckReason::FailOpen));
    }

    #[tokio::test]
    async fn test_rate_limited_route() {
        let config = GuardConfig {
            route_limits: vec![RouteLimit::new(
                "/api/contact",
                RateLimitConfig::new("contact", 2, Duration::from_secs(60)),
            )],
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(0), config);

        assert!(h.gate.check(&request("/api/contact")).await.allowed);
        assert!(h.gate.check(&request("/api/contact")).await.allowed);

        let result = h.gate.check(&request("/api/contact")).await;
        assert!(result.is_blocked());
        assert_eq!(result.reason, Some(CheckReason::RateLimited));
        assert!(result.retry_after.is_some_and(|s| s > 0 && s <= 60));

        // Unlimited paths and other clients are unaffected
        assert!(h.gate.check(&request("/protected")).await.allowed);
        let other = RequestContext::new(Method::GET, "/api/contact", HeaderMap::new());
        assert!(h.gate.check(&other).await.allowed);

        let metrics = h.gate.telemetry().get_metrics();
        assert_eq!(metrics.rate_limited_requests, 1);
        assert_eq!(metrics.blocked_requests, 1);
        assert_eq!(metrics.top_blocked_endpoints[0].endpoint, "/api/contact");
    }

    #[tokio::test]
    async fn test_skip_if_successful_route_is_not_recorded_by_gate() {
        let config = GuardConfig {
            route_limits: vec![RouteLimit::new(
                "/api/auth/login",
                RateLimitConfig::new("login", 2, Duration::from_secs(60)).skip_if_successful(),
            )],
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(0), config);
        let limit = h.gate.config().route_limit_for("/api/auth/login").unwrap().clone();

        for _ in 0..5 {
            assert!(h.gate.check(&request("/api/auth/login")).await.allowed);
        }

        for _ in 0..2 {
            h.gate.rate_limiter().record_request("203.0.113.7", &limit, false).await;
        }
        let result = h.gate.check(&request("/api/auth/login")).await;
        assert_eq!(result.reason, Some(CheckReason::RateLimited));
    }

    #[tokio::test]
    async fn test_work_token_passes_pow_gate() {
        let h = harness(StaticRiskScorer::new(80), test_config());
        assert!(h.gate.flags().set_flag(FeatureFlag::PowEnforceHighRisk, true, None).await);

        let expires_at_ms = Utc::now().timestamp_millis() + 60_000;
        WorkTokenRepository::create(h.pow_store.as_ref(), &token_digest(WORK_TOKEN), expires_at_ms)
            .await
            .unwrap();

        let gated = h.gate.check(&request("/protected")).await;
        assert_eq!(gated.gate_required, Some(GateKind::Pow));

        let forged = with_header(
            request("/protected"),
            "x-work-token",
            "00000000000000000000000000000000.00000000000000000000000000000000",
        );
        assert_eq!(h.gate.check(&forged).await.gate_required, Some(GateKind::Pow));

        let passed = h.gate.check(&with_header(request("/protected"), "x-work-token", WORK_TOKEN)).await;
        assert!(passed.allowed);
        assert_eq!(passed.reason, Some(CheckReason::GatePassed));
        assert_eq!(passed.risk_score, Some(80));
    }

    #[tokio::test]
    async fn test_pass_never_bypasses_block() {
        let h = harness(StaticRiskScorer::new(95), test_config());
        let expires_at_ms = Utc::now().timestamp_millis() + 60_000;
        WorkTokenRepository::create(h.pow_store.as_ref(), &token_digest(WORK_TOKEN), expires_at_ms)
            .await
            .unwrap();

        let ctx = with_header(
            with_header(request("/protected"), "x-work-token", WORK_TOKEN),
            "x-captcha-token",
            "pass",
        );
        assert!(h.gate.check(&ctx).await.is_blocked());
    }

    #[tokio::test]
    async fn test_captcha_token_passes_captcha_gate() {
        let h = harness(StaticRiskScorer::new(60), test_config());

        let rejected = h.gate.check(&with_header(request("/protected"), "x-captcha-token", "nope")).await;
        assert_eq!(rejected.gate_required, Some(GateKind::Captcha));

        let passed = h.gate.check(&with_header(request("/protected"), "x-captcha-token", "pass")).await;
        assert!(passed.allowed);
        assert_eq!(passed.reason, Some(CheckReason::GatePassed));

        let metrics = h.gate.telemetry().get_metrics();
        assert_eq!(metrics.captcha_attempts, 2);
        assert_eq!(metrics.captcha_success_rate, 0.5);
    }

    #[tokio::test]
    async fn test_decision_events_are_persisted() {
        let h = harness(StaticRiskScorer::new(60), test_config());
        let ctx = request("/protected").with_user_id("user-1");
        h.gate.check(&ctx).await;

        let events = wait_for_events(&h.store, 1).await;
        assert_eq!(events[0].event_type, SecurityEventType::CaptchaRequired);
        assert_eq!(events[0].user_id.as_deref(), Some("user-1"));
        assert_eq!(events[0].user_agent.as_deref(), Some("test-agent"));
        assert_eq!(events[0].risk_score, Some(60));
        assert!(!events[0].blocked);
    }
}

#[cfg(test)]
mod http_tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use platform::rate_limit::RateLimitConfig;
    use pow::domain::services::solution_hash;
    use pow::domain::value_objects::DifficultyTarget;
    use pow::{Difficulty, MemoryPowRepository, PowConfig, ProofOfWork};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use super::support::{TokenCaptcha, harness, test_config, wait_for_audit};
    use crate::application::config::{GuardConfig, RouteLimit};
    use crate::domain::collaborators::StaticRiskScorer;
    use crate::domain::flags::FeatureFlag;
    use crate::infra::memory::MemoryGuardRepository;
    use crate::presentation::handlers::{GuardAppState, check_status};
    use crate::presentation::middleware::security_gate;
    use crate::presentation::router::{challenge_router, security_router};

    type Middleware = crate::application::security_check::SecurityMiddleware<
        MemoryGuardRepository,
        MemoryPowRepository,
        StaticRiskScorer,
        TokenCaptcha,
    >;

    const ADMIN_TOKEN: &str = "admin-secret";

    fn app(gate: Arc<Middleware>, pow_store: Arc<MemoryPowRepository>) -> Router {
        let pow = Arc::new(ProofOfWork::new(Arc::new(PowConfig {
            difficulty: Difficulty::new(8).unwrap(),
            attack_difficulty: Difficulty::new(10).unwrap(),
            ..PowConfig::default()
        })));
        let state = GuardAppState {
            gate: gate.clone(),
            pow_store,
            pow,
        };

        Router::new()
            .route("/api/security/check", get(check_status))
            .route("/api/contact", get(check_status))
            .layer(from_fn_with_state(
                gate,
                security_gate::<MemoryGuardRepository, MemoryPowRepository, StaticRiskScorer, TokenCaptcha>,
            ))
            .nest("/api/pow", challenge_router(state.clone()))
            .nest("/api/security", security_router(state))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn solve(challenge_id: &str, bits: u8) -> (u64, String) {
        let target = DifficultyTarget::from_bits(bits);
        (0u64..)
            .map(|nonce| (nonce, solution_hash(challenge_id, nonce)))
            .find(|(_, hash)| target.is_met_by(hash))
            .unwrap()
    }

    #[tokio::test]
    async fn test_allowed_request_passes_with_debug_headers() {
        let h = harness(StaticRiskScorer::new(10), test_config());
        let response = app(h.gate, h.pow_store)
            .oneshot(get_req("/api/security/check"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-risk-score"], "10");
        let body = body_json(response).await;
        assert_eq!(body["allowed"], true);
        assert_eq!(body["riskScore"], 10);
    }

    #[tokio::test]
    async fn test_gated_request_gets_401() {
        let config = GuardConfig {
            debug_headers: false,
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(60), config);
        let response = app(h.gate, h.pow_store)
            .oneshot(get_req("/api/security/check"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["x-gate-required"], "captcha");
        assert!(response.headers().get("x-risk-score").is_none());
        let body = body_json(response).await;
        assert_eq!(body["gate"], "captcha");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn test_blocked_request_gets_403() {
        let h = harness(StaticRiskScorer::new(99), test_config());
        let response = app(h.gate, h.pow_store)
            .oneshot(get_req("/api/security/check"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_rate_limited_request_gets_429() {
        let config = GuardConfig {
            route_limits: vec![RouteLimit::new(
                "/api/contact",
                RateLimitConfig::new("contact", 1, Duration::from_secs(60)),
            )],
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(0), config);
        let app = app(h.gate, h.pow_store);

        let first = app.clone().oneshot(get_req("/api/contact")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get_req("/api/contact")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = second.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!(retry_after > 0 && retry_after <= 60);
    }

    #[tokio::test]
    async fn test_pow_round_trip_unlocks_gate() {
        let h = harness(StaticRiskScorer::new(80), test_config());
        assert!(h.gate.flags().set_flag(FeatureFlag::PowEnforceHighRisk, true, None).await);
        let app = app(h.gate, h.pow_store);

        let gated = app.clone().oneshot(get_req("/api/security/check")).await.unwrap();
        assert_eq!(gated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(gated.headers()["x-gate-required"], "pow");

        let challenge = body_json(app.clone().oneshot(get_req("/api/pow/challenge")).await.unwrap()).await;
        assert_eq!(challenge["difficulty"], 8);
        let challenge_id = challenge["challengeId"].as_str().unwrap().to_string();
        let (nonce, hash) = solve(&challenge_id, 8);

        let submit = serde_json::json!({
            "challengeId": challenge_id,
            "nonce": nonce,
            "hash": hash,
            "solveTimeMs": 1500,
        })
        .to_string();
        let verify = |body: String| {
            Request::builder()
                .method("POST")
                .uri("/api/pow/verify")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        let response = app.clone().oneshot(verify(submit.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await["token"].as_str().unwrap().to_string();

        // Challenges are single-use
        let replay = app.clone().oneshot(verify(submit)).await.unwrap();
        assert_eq!(replay.status(), StatusCode::GONE);

        let request = Request::builder()
            .uri("/api/security/check")
            .header("x-work-token", token)
            .body(Body::empty())
            .unwrap();
        let passed = app.oneshot(request).await.unwrap();
        assert_eq!(passed.status(), StatusCode::OK);
        assert_eq!(body_json(passed).await["reason"], "gate_passed");
    }

    #[tokio::test]
    async fn test_challenge_difficulty_rises_under_attack() {
        let h = harness(StaticRiskScorer::new(0), test_config());
        assert!(h.gate.flags().set_flag(FeatureFlag::UnderAttack, true, None).await);

        let challenge = body_json(
            app(h.gate, h.pow_store)
                .oneshot(get_req("/api/pow/challenge"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(challenge["difficulty"], 10);
    }

    #[tokio::test]
    async fn test_challenge_endpoint_is_rate_limited() {
        let config = GuardConfig {
            route_limits: vec![RouteLimit::new(
                "/api/pow/challenge",
                RateLimitConfig::new("pow_challenge", 2, Duration::from_secs(60)),
            )],
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(0), config);
        let app = app(h.gate, h.pow_store.clone());
        let from = |ip: &str| {
            Request::builder()
                .uri("/api/pow/challenge")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let response = app.clone().oneshot(from("198.51.100.4")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let limited = app.clone().oneshot(from("198.51.100.4")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(h.pow_store.stored().0, 2);

        let other = app.oneshot(from("198.51.100.5")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_set_flag_by_name() {
        let config = GuardConfig {
            admin_token: Some(ADMIN_TOKEN.to_string()),
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(0), config);
        let app = app(h.gate.clone(), h.pow_store);
        let put = |name: &str, body: &'static str| {
            Request::builder()
                .method("PUT")
                .uri(format!("/api/security/flags/{name}"))
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(put("captcha_always_on", r#"{"enabled":true,"actor":"ops"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "CAPTCHA_ALWAYS_ON");
        assert_eq!(body["enabled"], true);
        assert!(h.gate.flags().get_flag(FeatureFlag::CaptchaAlwaysOn).await);

        let entries = wait_for_audit(&h.store, 1).await;
        assert_eq!(entries[0].actor, "ops");
        assert_eq!(entries[0].target, "CAPTCHA_ALWAYS_ON");

        let unknown = app
            .oneshot(put("NOT_A_FLAG", r#"{"enabled":true}"#))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert!(!h.gate.flags().get_flag(FeatureFlag::UnderAttack).await);
    }

    #[tokio::test]
    async fn test_admin_endpoints_hidden_without_token() {
        let h = harness(StaticRiskScorer::new(0), test_config());
        let response = app(h.gate, h.pow_store)
            .oneshot(get_req("/api/security/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_endpoints_require_bearer() {
        let config = GuardConfig {
            admin_token: Some(ADMIN_TOKEN.to_string()),
            ..test_config()
        };
        let h = harness(StaticRiskScorer::new(0), config);
        let app = app(h.gate.clone(), h.pow_store);
        let bearer = format!("Bearer {ADMIN_TOKEN}");

        let denied = Request::builder()
            .uri("/api/security/metrics")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(denied).await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let metrics = Request::builder()
            .uri("/api/security/metrics")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(metrics).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.get("totalRequests").is_some());

        let put = |name: &str| {
            Request::builder()
                .method("PUT")
                .uri(format!("/api/security/flags/{name}"))
                .header(header::AUTHORIZATION, &bearer)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"enabled":true,"actor":"ops"}"#))
                .unwrap()
        };
        let response = app.clone().oneshot(put("UNDER_ATTACK")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.gate.flags().get_flag(FeatureFlag::UnderAttack).await);

        let unknown = app.clone().oneshot(put("SELF_DESTRUCT")).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let flags = Request::builder()
            .uri("/api/security/flags")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap();
        let body = body_json(app.oneshot(flags).await.unwrap()).await;
        assert_eq!(body["flags"]["UNDER_ATTACK"], true);
        assert_eq!(body["defaults"]["UNDER_ATTACK"], false);
    }
}

#[cfg(test)]
mod error_tests {
    use axum::http::StatusCode;
    use kernel::error::{app_error::AppError, kind::ErrorKind};
    use pow::PowError;

    use crate::error::GuardError;

    #[test]
    fn test_status_codes() {
        assert_eq!(GuardError::timeout("risk_scorer").status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            GuardError::Store("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GuardError::RiskScorer("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(GuardError::from(PowError::ChallengeExpired).status_code(), StatusCode::GONE);
    }

    #[test]
    fn test_app_error_conversion() {
        let app: AppError = GuardError::from(PowError::InvalidSolution).into();
        assert_eq!(app.kind(), ErrorKind::Conflict);

        let app: AppError = GuardError::timeout("feature_flags.load").into();
        assert_eq!(app.kind(), ErrorKind::RequestTimeout);
        assert!(app.message().contains("feature_flags.load"));
    }
}
