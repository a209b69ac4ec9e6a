//! Feature Flags Manager
//!
//! Flag reads are served from a lock-free snapshot. A stale or missing
//! entry triggers one store query for every flag; a write swaps in an empty
//! snapshot so the next read goes to the store.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::events::AuditEntry;
use crate::domain::flags::{FeatureFlag, FeatureFlagSet};
use crate::domain::repository::FeatureFlagRepository;
use crate::error::{GuardError, GuardResult};
use crate::infra::writer::BackgroundWriter;

const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy)]
struct CachedFlag {
    enabled: bool,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct FlagCache {
    entries: [Option<CachedFlag>; FeatureFlag::ALL.len()],
}

impl FlagCache {
    fn filled(flags: FeatureFlagSet, expires_at: Instant) -> Self {
        let mut cache = Self::default();
        for (slot, flag) in cache.entries.iter_mut().zip(FeatureFlag::ALL) {
            *slot = Some(CachedFlag {
                enabled: flags.get(flag),
                expires_at,
            });
        }
        cache
    }

    fn fresh(&self, flag: FeatureFlag, now: Instant) -> Option<bool> {
        self.entries[slot_of(flag)]
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.enabled)
    }

    fn fresh_set(&self, now: Instant) -> Option<FeatureFlagSet> {
        FeatureFlag::ALL
            .into_iter()
            .try_fold(FeatureFlagSet::default(), |set, flag| {
                self.fresh(flag, now).map(|enabled| set.with(flag, enabled))
            })
    }
}

fn slot_of(flag: FeatureFlag) -> usize {
    FeatureFlag::ALL
        .iter()
        .position(|f| *f == flag)
        .unwrap_or_default()
}

pub struct FeatureFlagsManager<R>
where
    R: FeatureFlagRepository,
{
    repo: Arc<R>,
    writer: BackgroundWriter,
    defaults: FeatureFlagSet,
    ttl: Duration,
    store_timeout: Duration,
    cache: ArcSwap<FlagCache>,
}

impl<R> FeatureFlagsManager<R>
where
    R: FeatureFlagRepository,
{
    pub fn new(
        repo: Arc<R>,
        writer: BackgroundWriter,
        defaults: FeatureFlagSet,
        ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            writer,
            defaults,
            ttl,
            store_timeout,
            cache: ArcSwap::from_pointee(FlagCache::default()),
        }
    }

    /// Current value of every flag. Never fails.
    pub async fn get_flags(&self) -> FeatureFlagSet {
        if let Some(flags) = self.cache.load().fresh_set(Instant::now()) {
            return flags;
        }
        self.refresh().await
    }

    pub async fn get_flag(&self, flag: FeatureFlag) -> bool {
        if let Some(enabled) = self.cache.load().fresh(flag, Instant::now()) {
            return enabled;
        }
        self.refresh().await.get(flag)
    }

    /// Persist a flag value. Returns `false` when the store rejected it.
    pub async fn set_flag(&self, flag: FeatureFlag, enabled: bool, actor: Option<&str>) -> bool {
        let actor = actor.unwrap_or(SYSTEM_ACTOR);

        let result = tokio::time::timeout(self.store_timeout, self.repo.upsert(flag, enabled, actor))
            .await
            .unwrap_or_else(|_| Err(GuardError::timeout("feature_flags.upsert")));

        if let Err(e) = result {
            tracing::error!(flag = %flag, enabled, actor, error = %e, "Failed to update feature flag");
            return false;
        }

        self.cache.store(Arc::new(FlagCache::default()));
        self.writer
            .submit_audit(AuditEntry::flag_update(actor, flag.name(), enabled));

        tracing::info!(flag = %flag, enabled, actor, "Feature flag updated");
        true
    }

    /// Insert a row for every flag that has none yet. Returns how many were created.
    pub async fn initialize_flags(&self) -> GuardResult<usize> {
        let mut created = 0;
        for flag in FeatureFlag::ALL {
            let inserted = tokio::time::timeout(
                self.store_timeout,
                self.repo
                    .insert_if_absent(flag, self.defaults.get(flag), flag.description()),
            )
            .await
            .map_err(|_| GuardError::timeout("feature_flags.initialize"))??;

            if inserted {
                created += 1;
            }
        }

        self.cache.store(Arc::new(FlagCache::default()));
        tracing::info!(created, "Feature flags initialized");
        Ok(created)
    }

    /// Defaults in effect when the store is unavailable
    pub fn defaults(&self) -> FeatureFlagSet {
        self.defaults
    }

    async fn refresh(&self) -> FeatureFlagSet {
        let before = self.cache.load_full();

        let flags = match self.load_from_store().await {
            Ok(flags) => flags,
            Err(e) => {
                tracing::warn!(error = %e, "Feature flag store unavailable, using defaults");
                self.defaults
            }
        };

        // A write that landed during the query wins; its empty snapshot stays
        let fresh = Arc::new(FlagCache::filled(flags, Instant::now() + self.ttl));
        self.cache.compare_and_swap(&before, fresh);
        flags
    }

    async fn load_from_store(&self) -> GuardResult<FeatureFlagSet> {
        let rows = tokio::time::timeout(self.store_timeout, self.repo.load_all())
            .await
            .map_err(|_| GuardError::timeout("feature_flags.load"))??;

        let mut flags = self.defaults;
        for row in rows {
            match row.name.parse::<FeatureFlag>() {
                Ok(flag) => flags.set(flag, row.enabled),
                Err(_) => tracing::debug!(name = %row.name, "Ignoring unknown stored flag"),
            }
        }
        Ok(flags)
    }
}
