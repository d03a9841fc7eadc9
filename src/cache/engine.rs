//! Freshness cache engine: read-through with refresh on miss or staleness.
//!
//! Per key the chain is fresh cache → refresh → stale cache → failure. The
//! direct-provider tier sits one level up in
//! [`crate::service::AggregateCacheService::get_many_with_direct_fallback`].

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::freshness::{age_hours, classify_for_read, Freshness, ResolveOptions};
use super::record::{CacheRecord, DataSource, Item};
use super::store::ActiveStore;
use crate::clock::Clock;
use crate::error::CacheError;
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::universe::normalize_key;

pub const NO_DATA_ERROR: &str = "no data available and refresh failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
    /// Served from a fresh record, cached or just fetched.
    Fresh,
    /// Refresh failed, an older record was served instead.
    Stale,
    /// Nothing to serve.
    Missing,
    /// Rejected before any I/O.
    Error,
}

/// What `resolve` produced for one key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolved {
    pub key: String,
    pub status: ResolveStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DataSource>,
    pub items: Vec<Item>,
    pub item_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl Resolved {
    fn served(
        key: &str,
        status: ResolveStatus,
        source: DataSource,
        record: CacheRecord,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.to_string(),
            status,
            success: true,
            source: Some(source),
            age_hours: Some(age_hours(&record, now)),
            last_updated: Some(record.last_updated),
            item_count: record.item_count,
            items: record.items,
            warning: None,
            error: None,
            retry_after_secs: None,
        }
    }

    fn failed(key: &str, status: ResolveStatus, error: String, retry_after_secs: Option<u64>) -> Self {
        Self {
            key: key.to_string(),
            status,
            success: false,
            source: None,
            items: Vec::new(),
            item_count: 0,
            last_updated: None,
            age_hours: None,
            warning: None,
            error: Some(error),
            retry_after_secs,
        }
    }

    /// A record that was just fetched from the provider.
    pub fn fresh_from_provider(key: &str, record: CacheRecord, now: DateTime<Utc>) -> Self {
        Self::served(key, ResolveStatus::Fresh, DataSource::FreshProvider, record, now)
    }

    pub fn rejected(key: &str, err: &CacheError) -> Self {
        Self::failed(key, ResolveStatus::Error, err.to_string(), None)
    }

    pub fn is_stale_or_missing(&self) -> bool {
        matches!(self.status, ResolveStatus::Stale | ResolveStatus::Missing)
    }
}

#[derive(Clone)]
pub struct FreshnessEngine {
    store: ActiveStore,
    coordinator: RefreshCoordinator,
    clock: Arc<dyn Clock>,
}

impl FreshnessEngine {
    pub fn new(store: ActiveStore, coordinator: RefreshCoordinator, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            coordinator,
            clock,
        }
    }

    pub fn store(&self) -> &ActiveStore {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Source tag for a record served straight from the active store.
    fn hit_source(&self) -> DataSource {
        if self.store.is_volatile() {
            DataSource::VolatileFallback
        } else {
            DataSource::Cache
        }
    }

    /// Resolves every key independently and concurrently. Always returns one
    /// entry per distinct requested key; failures are carried in the entries.
    pub async fn resolve(&self, keys: &[String], options: &ResolveOptions) -> BTreeMap<String, Resolved> {
        debug!(
            "🔎 Resolving {} keys (max age {}h, force fresh: {})",
            keys.len(),
            options.max_age_hours,
            options.force_fresh
        );
        let resolved = join_all(keys.iter().map(|key| self.resolve_one(key, options))).await;
        resolved.into_iter().map(|r| (r.key.clone(), r)).collect()
    }

    pub async fn resolve_one(&self, raw_key: &str, options: &ResolveOptions) -> Resolved {
        let key = match self.coordinator.universe().validate(raw_key) {
            Ok(key) => key,
            Err(err) => {
                warn!("🚫 {}", err);
                return Resolved::rejected(&normalize_key(raw_key), &err);
            }
        };

        let existing = match self.store.read(&key).await {
            Ok(record) => record,
            Err(err) => {
                warn!("⚠️ Cache read failed for {}, treating as missing: {}", key, err);
                None
            }
        };

        let now = self.clock.now();
        match classify_for_read(existing.as_ref(), now, options) {
            Freshness::Fresh => {
                if let Some(record) = existing {
                    debug!("✅ Cache hit for {} ({} items)", key, record.item_count);
                    return Resolved::served(&key, ResolveStatus::Fresh, self.hit_source(), record, now);
                }
                // classify never reports Fresh without a record
                Resolved::failed(&key, ResolveStatus::Missing, NO_DATA_ERROR.to_string(), None)
            }
            freshness => {
                info!("🔄 {} is {:?}, refreshing", key, freshness);
                let outcome = self.coordinator.refresh_one(&key).await;
                self.after_refresh(&key, existing, outcome).await
            }
        }
    }

    async fn after_refresh(
        &self,
        key: &str,
        existing: Option<CacheRecord>,
        outcome: RefreshOutcome,
    ) -> Resolved {
        let now = self.clock.now();
        if outcome.success {
            let record = match outcome.record {
                Some(record) => Some(record),
                None => self.store.read(key).await.ok().flatten(),
            };
            if let Some(record) = record {
                return Resolved::fresh_from_provider(key, record, now);
            }
        }

        let reason = outcome
            .error
            .unwrap_or_else(|| "refreshed record could not be read back".to_string());

        match existing.filter(|record| !record.is_empty()) {
            Some(record) => {
                let mut resolved =
                    Resolved::served(key, ResolveStatus::Stale, DataSource::StaleCache, record, now);
                let age = resolved.age_hours.unwrap_or_default();
                warn!("⚠️ Serving stale data for {} ({:.1} hours old): {}", key, age, reason);
                resolved.warning = Some(format!(
                    "Refresh failed ({}); serving cached data {:.1} hours old",
                    reason, age
                ));
                resolved.retry_after_secs = outcome.retry_after_secs;
                resolved
            }
            None => {
                warn!("❌ No data for {}: {}", key, reason);
                Resolved::failed(
                    key,
                    ResolveStatus::Missing,
                    format!("{}: {}", NO_DATA_ERROR, reason),
                    outcome.retry_after_secs,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_store::MemoryStore;
    use crate::cache::store::{CacheStore, StoreKind};
    use crate::refresh::RefreshSettings;
    use crate::testing::{articles, record_aged, ManualClock, MockProvider, StallingStore};
    use crate::universe::KeyUniverse;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    struct Fixture {
        engine: FreshnessEngine,
        provider: Arc<MockProvider>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(kind: StoreKind) -> Fixture {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let active = ActiveStore::new(store.clone(), kind, Duration::from_secs(1));
        let coordinator = RefreshCoordinator::new(
            active.clone(),
            provider.clone(),
            Arc::new(KeyUniverse::new(["AAPL", "TSLA", "KO"])),
            clock.clone(),
            RefreshSettings {
                provider_timeout: Duration::from_secs(1),
                batch_delay: Duration::ZERO,
            },
        );
        Fixture {
            engine: FreshnessEngine::new(active, coordinator, clock.clone()),
            provider,
            store,
            clock,
        }
    }

    #[tokio::test]
    async fn fresh_record_is_served_without_provider_call() {
        let f = fixture(StoreKind::Persistent);
        let record = record_aged("AAPL", 2, f.clock.now(), ChronoDuration::hours(1));
        f.store.write("AAPL", &record).await.unwrap();

        let resolved = f.engine.resolve_one("aapl", &ResolveOptions::news()).await;
        assert_eq!(resolved.status, ResolveStatus::Fresh);
        assert_eq!(resolved.source, Some(DataSource::Cache));
        assert_eq!(resolved.item_count, 2);
        assert_eq!(f.provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn volatile_hits_are_tagged() {
        let f = fixture(StoreKind::Volatile);
        let record = record_aged("KO", 1, f.clock.now(), ChronoDuration::minutes(5));
        f.store.write("KO", &record).await.unwrap();

        let resolved = f.engine.resolve_one("KO", &ResolveOptions::news()).await;
        assert_eq!(resolved.source, Some(DataSource::VolatileFallback));
    }

    #[tokio::test]
    async fn empty_record_triggers_refresh() {
        let f = fixture(StoreKind::Persistent);
        let empty = CacheRecord::new("AAPL", vec![], f.clock.now());
        f.store.write("AAPL", &empty).await.unwrap();
        f.provider.set_items("AAPL", articles(1));

        let resolved = f.engine.resolve_one("AAPL", &ResolveOptions::news()).await;
        assert_eq!(resolved.source, Some(DataSource::FreshProvider));
        assert_eq!(f.provider.calls("AAPL"), 1);
    }

    #[tokio::test]
    async fn empty_record_with_failed_refresh_is_missing() {
        let f = fixture(StoreKind::Persistent);
        let empty = CacheRecord::new("AAPL", vec![], f.clock.now());
        f.store.write("AAPL", &empty).await.unwrap();

        let resolved = f.engine.resolve_one("AAPL", &ResolveOptions::news()).await;
        assert_eq!(resolved.status, ResolveStatus::Missing);
        assert!(!resolved.success);
    }

    #[tokio::test]
    async fn force_fresh_refreshes_young_record() {
        let f = fixture(StoreKind::Persistent);
        let record = record_aged("TSLA", 1, f.clock.now(), ChronoDuration::minutes(1));
        f.store.write("TSLA", &record).await.unwrap();
        f.provider.set_items("TSLA", articles(4));

        let resolved = f
            .engine
            .resolve_one("TSLA", &ResolveOptions::news().forced())
            .await;
        assert_eq!(resolved.source, Some(DataSource::FreshProvider));
        assert_eq!(resolved.item_count, 4);
    }

    #[tokio::test]
    async fn unsupported_key_is_rejected_without_io() {
        let f = fixture(StoreKind::Persistent);
        let resolved = f.engine.resolve_one("GME", &ResolveOptions::news()).await;
        assert_eq!(resolved.status, ResolveStatus::Error);
        assert!(resolved.error.unwrap().contains("GME"));
        assert_eq!(f.provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn missing_key_reports_refresh_failure() {
        let f = fixture(StoreKind::Persistent);
        f.provider.set_error(
            "KO",
            CacheError::ProviderRateLimited {
                message: "Rate limit exceeded".to_string(),
                retry_after_secs: Some(60),
            },
        );
        let resolved = f.engine.resolve_one("KO", &ResolveOptions::news()).await;
        assert_eq!(resolved.status, ResolveStatus::Missing);
        assert!(resolved.error.unwrap().starts_with(NO_DATA_ERROR));
        assert_eq!(resolved.retry_after_secs, Some(60));
    }

    #[tokio::test]
    async fn duplicate_keys_collapse_to_one_entry() {
        let f = fixture(StoreKind::Persistent);
        f.provider.set_items("AAPL", articles(1));
        let keys = vec!["AAPL".to_string(), "aapl".to_string()];
        let resolved = f.engine.resolve(&keys, &ResolveOptions::news()).await;
        assert_eq!(resolved.len(), 1);
        assert!(resolved["AAPL"].success);
    }

    #[tokio::test]
    async fn rejected_keys_are_keyed_like_accepted_ones() {
        let f = fixture(StoreKind::Persistent);
        let keys = vec!["doge".to_string(), " DOGE ".to_string()];
        let resolved = f.engine.resolve(&keys, &ResolveOptions::news()).await;
        assert_eq!(resolved.len(), 1);
        let doge = &resolved["DOGE"];
        assert_eq!(doge.key, "DOGE");
        assert!(doge.error.as_deref().unwrap_or_default().contains("DOGE"));
    }

    #[tokio::test]
    async fn timed_out_read_still_refreshes() {
        let provider = Arc::new(MockProvider::new());
        provider.set_items("AAPL", articles(2));
        let clock = Arc::new(ManualClock::default());
        let backing = Arc::new(MemoryStore::new());
        let stalling = StallingStore::new(backing.clone(), Duration::from_secs(3600));
        let active = ActiveStore::new(Arc::new(stalling), StoreKind::Persistent, Duration::from_millis(50));
        let coordinator = RefreshCoordinator::new(
            active.clone(),
            provider.clone(),
            Arc::new(KeyUniverse::new(["AAPL"])),
            clock.clone(),
            RefreshSettings {
                provider_timeout: Duration::from_secs(1),
                batch_delay: Duration::ZERO,
            },
        );
        let engine = FreshnessEngine::new(active, coordinator, clock);

        let resolved = engine.resolve_one("AAPL", &ResolveOptions::news()).await;
        assert_eq!(resolved.status, ResolveStatus::Fresh);
        assert_eq!(resolved.source, Some(DataSource::FreshProvider));
        assert_eq!(resolved.item_count, 2);
        assert_eq!(provider.calls("AAPL"), 1);
        assert_eq!(backing.read("AAPL").await.unwrap().map(|r| r.item_count), Some(2));
    }
}
