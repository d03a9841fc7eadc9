//! Aggregate cache service: the façade route handlers talk to.
//!
//! Owns the ticker universe and the active store chosen at startup, delegates
//! per-key reads to the [`FreshnessEngine`] and derives statistics by scanning
//! the universe.

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::engine::{FreshnessEngine, Resolved};
use crate::cache::freshness::{ResolveOptions, NEWS_MAX_AGE_HOURS, PROFILE_MAX_AGE_HOURS};
use crate::cache::record::{stamp_items, CacheRecord, Item};
use crate::cache::store::{ActiveStore, StoreKind};
use crate::clock::Clock;
use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::CacheError;
use crate::provider::ProviderClient;
use crate::refresh::{
    BatchOutcome, RefreshCoordinator, RefreshOutcome, RefreshScheduler, RefreshSettings,
    SchedulerSettings,
};
use crate::stats::{CacheStats, KeyStatus};
use crate::universe::KeyUniverse;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Which data this service caches; picks the default read threshold.
    pub dataset: Dataset,
    /// Default threshold for multi-key (news) reads.
    pub news_max_age_hours: f64,
    /// Default threshold for single-ticker profile reads.
    pub profile_max_age_hours: f64,
    /// Threshold `get_stats` classifies against.
    pub stats_max_age_hours: f64,
    /// Pause between calls on the direct-provider tier.
    pub fallback_batch_delay: Duration,
    /// Bound on one provider call on the direct-provider tier.
    pub provider_timeout: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &Config, dataset: Dataset) -> Self {
        Self {
            dataset,
            news_max_age_hours: config.news_max_age_hours,
            profile_max_age_hours: config.profile_max_age_hours,
            stats_max_age_hours: config.stats_max_age_hours,
            fallback_batch_delay: config.fallback_batch_delay(),
            provider_timeout: config.provider_timeout(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            dataset: Dataset::News,
            news_max_age_hours: NEWS_MAX_AGE_HOURS,
            profile_max_age_hours: PROFILE_MAX_AGE_HOURS,
            stats_max_age_hours: PROFILE_MAX_AGE_HOURS,
            fallback_batch_delay: Duration::from_millis(800),
            provider_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a multi-key read that may have gone to the provider directly.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackReport {
    pub results: BTreeMap<String, Resolved>,
    /// Keys the direct-provider tier managed to fetch.
    pub refreshed_keys: Vec<String>,
    pub fallback_used: bool,
    pub still_stale_or_missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearOutcome {
    pub key: String,
    /// Whether a record was actually removed.
    pub cleared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearAllOutcome {
    pub cleared_count: usize,
    pub total: usize,
    pub failures: Vec<ClearOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub dataset: Dataset,
    pub store_kind: StoreKind,
    pub store_name: String,
    pub supported_keys: Vec<String>,
    pub cached_keys: Vec<String>,
}

#[derive(Clone)]
pub struct AggregateCacheService {
    engine: FreshnessEngine,
    provider: Arc<dyn ProviderClient>,
    settings: ServiceSettings,
}

impl AggregateCacheService {
    /// Wires coordinator and engine around an already selected store.
    pub fn new(
        store: ActiveStore,
        provider: Arc<dyn ProviderClient>,
        universe: Arc<KeyUniverse>,
        clock: Arc<dyn Clock>,
        refresh: RefreshSettings,
        settings: ServiceSettings,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            Arc::clone(&provider),
            universe,
            Arc::clone(&clock),
            refresh,
        );
        info!(
            "🗄️ {} cache service ready: {} tickers on {} store ({:?}), provider {}",
            settings.dataset,
            coordinator.universe().len(),
            store.name(),
            store.kind(),
            provider.name()
        );
        Self {
            engine: FreshnessEngine::new(store, coordinator, clock),
            provider,
            settings,
        }
    }

    pub fn engine(&self) -> &FreshnessEngine {
        &self.engine
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn supported_keys(&self) -> &[String] {
        self.engine.coordinator().universe().keys()
    }

    /// A scheduler driving this service's coordinator.
    pub fn scheduler(&self, settings: SchedulerSettings) -> RefreshScheduler {
        RefreshScheduler::new(
            self.engine.coordinator().clone(),
            Arc::clone(self.engine.clock()),
            settings,
        )
    }

    pub fn news_options(&self) -> ResolveOptions {
        ResolveOptions::new(self.settings.news_max_age_hours, false)
    }

    pub fn profile_options(&self) -> ResolveOptions {
        ResolveOptions::new(self.settings.profile_max_age_hours, false)
    }

    /// Threshold readers get when they do not name one.
    pub fn default_options(&self) -> ResolveOptions {
        match self.settings.dataset {
            Dataset::News => self.news_options(),
            Dataset::Quotes => self.profile_options(),
        }
    }

    pub async fn get_many(&self, keys: &[String], options: &ResolveOptions) -> BTreeMap<String, Resolved> {
        self.engine.resolve(keys, options).await
    }

    pub async fn get_one(&self, key: &str, options: &ResolveOptions) -> Resolved {
        self.engine.resolve_one(key, options).await
    }

    pub async fn get_all(&self, options: &ResolveOptions) -> BTreeMap<String, Resolved> {
        let keys = self.supported_keys().to_vec();
        self.engine.resolve(&keys, options).await
    }

    /// `get_many`, then a direct provider pass for whatever is still stale or
    /// missing. Fetched records are written back when the store allows it and
    /// served as fresh either way.
    pub async fn get_many_with_direct_fallback(
        &self,
        keys: &[String],
        options: &ResolveOptions,
    ) -> FallbackReport {
        let mut results = self.engine.resolve(keys, options).await;
        let pending: Vec<String> = results
            .values()
            .filter(|r| r.is_stale_or_missing())
            .map(|r| r.key.clone())
            .collect();

        let mut refreshed_keys = Vec::new();
        if !pending.is_empty() {
            info!(
                "🆘 {} tickers still stale or missing, fetching directly: {}",
                pending.len(),
                pending.join(", ")
            );
            let fetches = self
                .provider
                .fetch_many(
                    &pending,
                    self.settings.fallback_batch_delay,
                    self.settings.provider_timeout,
                )
                .await;

            for fetch in fetches {
                let items = match fetch.result {
                    Ok(items) if !items.is_empty() => items,
                    Ok(_) => {
                        debug!("📭 Direct fetch for {} returned no items", fetch.key);
                        continue;
                    }
                    Err(err) => {
                        debug!("Direct fetch for {} failed: {}", fetch.key, err);
                        continue;
                    }
                };
                let resolved = self.write_back(&fetch.key, items).await;
                refreshed_keys.push(fetch.key.clone());
                results.insert(fetch.key, resolved);
            }
        }

        let still_stale_or_missing = results
            .values()
            .filter(|r| r.is_stale_or_missing())
            .map(|r| r.key.clone())
            .collect();

        FallbackReport {
            results,
            refreshed_keys,
            fallback_used: !pending.is_empty(),
            still_stale_or_missing,
        }
    }

    async fn write_back(&self, key: &str, items: Vec<Item>) -> Resolved {
        let store = self.engine.store();
        let now = self.engine.clock().now();
        let record = CacheRecord::new(key, stamp_items(key, items, now), now);
        if let Err(err) = store.write(key, &record).await {
            warn!("⚠️ Could not cache directly fetched data for {}: {}", key, err);
            return Resolved::fresh_from_provider(key, record, now);
        }
        let stored = match store.read(key).await {
            Ok(Some(stored)) => stored,
            _ => record,
        };
        Resolved::fresh_from_provider(key, stored, now)
    }

    async fn key_status_at(&self, key: &str, max_age_hours: f64) -> KeyStatus {
        let store = self.engine.store();
        match store.read(key).await {
            Ok(record) => KeyStatus::from_record(record.as_ref(), self.engine.clock().now(), max_age_hours),
            Err(err) => {
                warn!("⚠️ Error checking cache status for {}: {}", key, err);
                KeyStatus::read_failed(err.to_string())
            }
        }
    }

    pub async fn key_status(&self, raw_key: &str) -> Result<KeyStatus, CacheError> {
        let key = self.engine.coordinator().universe().validate(raw_key)?;
        Ok(self.key_status_at(&key, self.settings.stats_max_age_hours).await)
    }

    pub async fn get_stats(&self) -> CacheStats {
        self.get_stats_with_max_age(self.settings.stats_max_age_hours).await
    }

    pub async fn get_stats_with_max_age(&self, max_age_hours: f64) -> CacheStats {
        let keys = self.supported_keys();
        let statuses = join_all(keys.iter().map(|key| self.key_status_at(key, max_age_hours))).await;
        let per_key = keys.iter().cloned().zip(statuses).collect();
        let stats = CacheStats::aggregate(per_key, max_age_hours, self.engine.store().kind(), self.engine.clock().now());
        debug!(
            "📊 Cache stats: {}/{} cached, {} fresh, {} stale, {} items",
            stats.cached_keys, stats.total_keys, stats.fresh_keys, stats.stale_keys, stats.total_items
        );
        stats
    }

    pub async fn clear_one(&self, raw_key: &str) -> ClearOutcome {
        let key = match self.engine.coordinator().universe().validate(raw_key) {
            Ok(key) => key,
            Err(err) => {
                return ClearOutcome {
                    key: raw_key.trim().to_string(),
                    cleared: false,
                    error: Some(err.to_string()),
                }
            }
        };
        match self.engine.store().delete(&key).await {
            Ok(cleared) => {
                if cleared {
                    info!("🗑️ Cleared cache for {}", key);
                }
                ClearOutcome {
                    key,
                    cleared,
                    error: None,
                }
            }
            Err(err) => {
                warn!("❌ Error clearing cache for {}: {}", key, err);
                ClearOutcome {
                    key,
                    cleared: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Deletes every key independently. `cleared_count` counts records that
    /// actually existed, so a repeated call reports zero.
    pub async fn clear_all(&self) -> ClearAllOutcome {
        let keys = self.supported_keys();
        let outcomes = join_all(keys.iter().map(|key| self.clear_one(key))).await;
        let cleared_count = outcomes.iter().filter(|o| o.cleared).count();
        let failures: Vec<ClearOutcome> = outcomes.into_iter().filter(|o| o.error.is_some()).collect();
        info!(
            "🗑️ Cleared {} cached tickers ({} failures)",
            cleared_count,
            failures.len()
        );
        ClearAllOutcome {
            cleared_count,
            total: keys.len(),
            failures,
        }
    }

    pub async fn cache_info(&self) -> CacheInfo {
        let stats = self.get_stats().await;
        let store = self.engine.store();
        CacheInfo {
            dataset: self.settings.dataset,
            store_kind: store.kind(),
            store_name: store.name().to_string(),
            supported_keys: self.supported_keys().to_vec(),
            cached_keys: stats
                .per_key
                .into_iter()
                .filter(|(_, s)| s.exists)
                .map(|(k, _)| k)
                .collect(),
        }
    }

    pub async fn refresh_one(&self, key: &str) -> RefreshOutcome {
        self.engine.coordinator().refresh_one(key).await
    }

    /// Refreshes the whole universe on demand, outside the scheduler.
    pub async fn refresh_all(&self) -> BatchOutcome {
        let keys = self.supported_keys().to_vec();
        self.engine.coordinator().refresh_all(&keys, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_store::MemoryStore;
    use crate::cache::store::CacheStore;
    use crate::testing::{articles, record_aged, ManualClock, MockProvider};
    use chrono::Duration as ChronoDuration;

    fn service(provider: Arc<MockProvider>, store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> AggregateCacheService {
        AggregateCacheService::new(
            ActiveStore::new(store, StoreKind::Persistent, Duration::from_secs(1)),
            provider,
            Arc::new(KeyUniverse::new(["AAPL", "TSLA", "KO"])),
            clock,
            RefreshSettings {
                provider_timeout: Duration::from_secs(1),
                batch_delay: Duration::ZERO,
            },
            ServiceSettings {
                fallback_batch_delay: Duration::ZERO,
                ..ServiceSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn clear_one_rejects_unknown_key() {
        let svc = service(
            Arc::new(MockProvider::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::default()),
        );
        let outcome = svc.clear_one("XYZ").await;
        assert!(!outcome.cleared);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn key_status_reports_age() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        store
            .write("KO", &record_aged("KO", 2, clock.now(), ChronoDuration::hours(2)))
            .await
            .unwrap();
        let svc = service(Arc::new(MockProvider::new()), store, clock);

        let status = svc.key_status("ko").await.unwrap();
        assert!(status.exists && status.fresh);
        assert_eq!(status.item_count, 2);
        assert!(svc.key_status("XYZ").await.is_err());
    }

    #[tokio::test]
    async fn cache_info_lists_cached_keys() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        store
            .write("TSLA", &record_aged("TSLA", 1, clock.now(), ChronoDuration::hours(1)))
            .await
            .unwrap();
        let svc = service(Arc::new(MockProvider::new()), store, clock);

        let info = svc.cache_info().await;
        assert_eq!(info.cached_keys, vec!["TSLA".to_string()]);
        assert_eq!(info.supported_keys.len(), 3);
        assert_eq!(info.store_kind, StoreKind::Persistent);
    }

    #[tokio::test]
    async fn direct_tier_rescues_missing_keys() {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::new());
        let svc = service(provider.clone(), store.clone(), Arc::new(ManualClock::default()));
        provider.fail_next("AAPL", CacheError::ProviderUnavailable("flaky".to_string()));
        provider.set_items("AAPL", articles(2));
        provider.set_items("KO", articles(1));

        let keys = vec!["AAPL".to_string(), "KO".to_string()];
        let report = svc.get_many_with_direct_fallback(&keys, &svc.news_options()).await;

        assert!(report.fallback_used);
        assert_eq!(report.refreshed_keys, vec!["AAPL".to_string()]);
        assert!(report.still_stale_or_missing.is_empty());
        assert_eq!(report.results["AAPL"].item_count, 2);
        assert_eq!(provider.calls("AAPL"), 2);
        assert_eq!(provider.calls("KO"), 1);
        assert!(store.read("AAPL").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn direct_tier_is_skipped_when_everything_resolved() {
        let provider = Arc::new(MockProvider::new());
        provider.set_items("TSLA", articles(1));
        let svc = service(provider, Arc::new(MemoryStore::new()), Arc::new(ManualClock::default()));

        let report = svc
            .get_many_with_direct_fallback(&["TSLA".to_string()], &svc.news_options())
            .await;
        assert!(!report.fallback_used);
        assert!(report.refreshed_keys.is_empty());
    }

    #[tokio::test]
    async fn direct_tier_keeps_fetched_keys_when_one_hangs() {
        let provider = Arc::new(MockProvider::new());
        let svc = AggregateCacheService::new(
            ActiveStore::new(Arc::new(MemoryStore::new()), StoreKind::Persistent, Duration::from_secs(1)),
            provider.clone(),
            Arc::new(KeyUniverse::new(["AAPL", "TSLA", "KO"])),
            Arc::new(ManualClock::default()),
            RefreshSettings {
                provider_timeout: Duration::from_millis(100),
                batch_delay: Duration::ZERO,
            },
            ServiceSettings {
                fallback_batch_delay: Duration::ZERO,
                provider_timeout: Duration::from_millis(100),
                ..ServiceSettings::default()
            },
        );
        provider.fail_next("AAPL", CacheError::ProviderUnavailable("flaky".to_string()));
        provider.set_items("AAPL", articles(2));
        provider.set_items("KO", articles(1));
        provider.set_key_latency("KO", Duration::from_secs(3600));
        provider.fail_next("TSLA", CacheError::ProviderUnavailable("flaky".to_string()));
        provider.set_items("TSLA", articles(3));

        let keys = vec!["AAPL".to_string(), "KO".to_string(), "TSLA".to_string()];
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            svc.get_many_with_direct_fallback(&keys, &svc.news_options()),
        )
        .await
        .expect("direct tier must not wait on the hanging key");

        assert_eq!(report.refreshed_keys, vec!["AAPL".to_string(), "TSLA".to_string()]);
        assert_eq!(report.still_stale_or_missing, vec!["KO".to_string()]);
        assert_eq!(report.results["TSLA"].item_count, 3);
        assert!(!report.results["KO"].success);
    }

    #[tokio::test]
    async fn quote_dataset_reads_against_profile_threshold() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        store
            .write("KO", &record_aged("KO", 1, clock.now(), ChronoDuration::hours(10)))
            .await
            .unwrap();
        let provider = Arc::new(MockProvider::new());
        let quotes = AggregateCacheService::new(
            ActiveStore::new(store.clone(), StoreKind::Persistent, Duration::from_secs(1)),
            provider.clone(),
            Arc::new(KeyUniverse::new(["KO"])),
            clock.clone(),
            RefreshSettings::default(),
            ServiceSettings {
                dataset: Dataset::Quotes,
                ..ServiceSettings::default()
            },
        );

        let resolved = quotes.get_one("KO", &quotes.default_options()).await;
        assert_eq!(resolved.status, crate::ResolveStatus::Fresh);
        assert_eq!(provider.total_calls(), 0);
        assert_eq!(quotes.cache_info().await.dataset, Dataset::Quotes);

        let news = service(provider.clone(), store, clock);
        assert_eq!(news.default_options().max_age_hours, 6.0);
        let resolved = news.get_one("KO", &news.default_options()).await;
        assert_eq!(resolved.source, Some(crate::DataSource::StaleCache));
        assert_eq!(provider.total_calls(), 1);
    }
}
