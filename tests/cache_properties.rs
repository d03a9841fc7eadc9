use assert_approx_eq::assert_approx_eq;
use chrono::Duration as ChronoDuration;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use ticker_cache::cache::store::CacheStore;
use ticker_cache::refresh::RefreshSettings;
use ticker_cache::service::{AggregateCacheService, ServiceSettings};
use ticker_cache::testing::{
    articles, init_test_logging, record_aged, ManualClock, MockProvider, UnavailableStore,
};
use ticker_cache::{
    ActiveStore, CacheError, Clock, DataSource, KeyUniverse, MemoryStore, ResolveOptions,
    ResolveStatus, StoreKind, StoreSelector,
};

const UNIVERSE: [&str; 5] = ["AAPL", "TSLA", "MSFT", "KO", "NVDA"];

struct Harness {
    service: AggregateCacheService,
    provider: Arc<MockProvider>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness_with(kind: StoreKind) -> Harness {
    init_test_logging();
    let provider = Arc::new(MockProvider::new());
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());
    let service = AggregateCacheService::new(
        ActiveStore::new(store.clone(), kind, Duration::from_secs(1)),
        provider.clone(),
        Arc::new(KeyUniverse::new(UNIVERSE)),
        clock.clone(),
        RefreshSettings {
            provider_timeout: Duration::from_secs(1),
            batch_delay: Duration::ZERO,
        },
        ServiceSettings {
            fallback_batch_delay: Duration::ZERO,
            ..ServiceSettings::default()
        },
    );
    Harness {
        service,
        provider,
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(StoreKind::Persistent)
}

fn keys(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|k| k.to_string()).collect()
}

#[tokio::test]
async fn record_exactly_at_threshold_is_stale() {
    let h = harness();
    let record = record_aged("MSFT", 2, h.clock.now(), ChronoDuration::hours(6));
    h.store.write("MSFT", &record).await.unwrap();

    let resolved = h
        .service
        .get_one("MSFT", &ResolveOptions::new(6.0, false))
        .await;
    assert_eq!(resolved.status, ResolveStatus::Stale);
    assert_eq!(resolved.source, Some(DataSource::StaleCache));
    assert_eq!(h.provider.calls("MSFT"), 1);
}

#[tokio::test]
async fn failed_refresh_leaves_record_untouched() {
    let h = harness();
    let record = record_aged("KO", 3, h.clock.now(), ChronoDuration::hours(40));
    h.store.write("KO", &record).await.unwrap();
    let before = h.store.read("KO").await.unwrap().unwrap().to_json().unwrap();

    h.provider
        .set_error("KO", CacheError::ProviderUnavailable("API Error: 503".to_string()));
    let outcome = h.service.refresh_one("KO").await;
    assert!(!outcome.success);

    let after = h.store.read("KO").await.unwrap().unwrap().to_json().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn empty_provider_payload_never_writes() {
    let h = harness();
    let record = record_aged("NVDA", 2, h.clock.now(), ChronoDuration::hours(10));
    h.store.write("NVDA", &record).await.unwrap();
    h.provider.set_items("NVDA", vec![]);

    let outcome = h.service.refresh_one("NVDA").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Empty Result: no data returned"));

    let stored = h.store.read("NVDA").await.unwrap().unwrap();
    assert_eq!(stored.last_updated, record.last_updated);
    assert_eq!(stored.items, record.items);
}

#[tokio::test]
async fn volatile_store_behaves_like_persistent() {
    let volatile = StoreSelector::select(
        Some(Arc::new(UnavailableStore)),
        Arc::new(MemoryStore::new()),
        Duration::from_secs(1),
    )
    .await;
    assert!(volatile.is_volatile());

    for kind in [StoreKind::Persistent, StoreKind::Volatile] {
        let h = harness_with(kind);
        h.provider.set_items("AAPL", articles(3));

        let first = h.service.get_one("AAPL", &ResolveOptions::news()).await;
        assert_eq!(first.source, Some(DataSource::FreshProvider));
        assert_eq!(first.item_count, 3);

        let second = h.service.get_one("AAPL", &ResolveOptions::news()).await;
        assert_eq!(second.status, ResolveStatus::Fresh);
        let expected_hit = match kind {
            StoreKind::Persistent => DataSource::Cache,
            StoreKind::Volatile => DataSource::VolatileFallback,
        };
        assert_eq!(second.source, Some(expected_hit));

        let outcome = h.service.refresh_one("AAPL").await;
        assert!(outcome.success);

        let stats = h.service.get_stats().await;
        assert_eq!(stats.store_kind, kind);
        assert_eq!(stats.cached_keys, 1);
        assert_eq!(stats.fresh_keys, 1);
        assert_eq!(stats.total_items, 3);
    }
}

#[tokio::test]
async fn batch_with_one_failing_key_still_answers_every_key() {
    let h = harness();
    h.provider.set_items("AAPL", articles(1));
    h.provider
        .set_error("TSLA", CacheError::ProviderUnavailable("Network Error".to_string()));
    h.provider.set_items("MSFT", articles(2));

    let results = h
        .service
        .get_many(&keys(&["AAPL", "TSLA", "MSFT"]), &ResolveOptions::news())
        .await;

    assert_eq!(results.len(), 3);
    assert!(results["AAPL"].success);
    assert!(results["MSFT"].success);
    let tsla = &results["TSLA"];
    assert!(!tsla.success);
    assert_eq!(tsla.status, ResolveStatus::Missing);
    assert!(tsla
        .error
        .as_deref()
        .unwrap_or_default()
        .starts_with("no data available and refresh failed"));
}

#[tokio::test]
async fn unsupported_keys_fail_in_place() {
    let h = harness();
    h.provider.set_items("AAPL", articles(1));
    let results = h
        .service
        .get_many(&keys(&["AAPL", "DOGE"]), &ResolveOptions::news())
        .await;
    assert_eq!(results.len(), 2);
    assert_eq!(results["DOGE"].status, ResolveStatus::Error);
    assert_eq!(h.provider.calls("DOGE"), 0);
}

#[tokio::test]
async fn clear_all_twice_reports_nothing_the_second_time() {
    let h = harness();
    for key in ["AAPL", "KO"] {
        let record = record_aged(key, 1, h.clock.now(), ChronoDuration::hours(1));
        h.store.write(key, &record).await.unwrap();
    }

    let first = h.service.clear_all().await;
    assert_eq!(first.cleared_count, 2);
    assert_eq!(first.total, 5);
    assert!(first.failures.is_empty());

    let second = h.service.clear_all().await;
    assert_eq!(second.cleared_count, 0);
    assert_eq!(second.total, 5);
    assert_eq!(h.service.get_stats().await.cached_keys, 0);
}

#[tokio::test]
async fn missing_key_is_fetched_then_served_from_cache() {
    let h = harness();
    h.provider.set_items("AAPL", articles(3));
    let options = ResolveOptions::new(6.0, false);

    let first = h.service.get_many(&keys(&["AAPL"]), &options).await;
    let aapl = &first["AAPL"];
    assert!(aapl.success);
    assert_eq!(aapl.items.len(), 3);
    assert_eq!(aapl.source, Some(DataSource::FreshProvider));

    h.clock.advance(ChronoDuration::hours(5));
    let second = h.service.get_many(&keys(&["AAPL"]), &options).await;
    assert_eq!(second["AAPL"].source, Some(DataSource::Cache));
    assert_eq!(h.provider.calls("AAPL"), 1);
}

#[tokio::test]
async fn stale_record_is_served_when_refresh_fails() {
    let h = harness();
    let record = record_aged("TSLA", 4, h.clock.now(), ChronoDuration::hours(30));
    h.store.write("TSLA", &record).await.unwrap();
    h.provider.set_error(
        "TSLA",
        CacheError::ProviderRateLimited {
            message: "Rate limit exceeded for TSLA".to_string(),
            retry_after_secs: Some(60),
        },
    );

    let resolved = h
        .service
        .get_one("TSLA", &ResolveOptions::new(24.0, false))
        .await;
    assert!(resolved.success);
    assert_eq!(resolved.source, Some(DataSource::StaleCache));
    assert!(resolved.warning.is_some());
    assert_approx_eq!(resolved.age_hours.unwrap(), 30.0, 0.01);
    assert_eq!(resolved.retry_after_secs, Some(60));
}

#[tokio::test]
async fn stats_over_mixed_universe() {
    let h = harness();
    let now = h.clock.now();
    h.store
        .write("AAPL", &record_aged("AAPL", 3, now, ChronoDuration::hours(1)))
        .await
        .unwrap();
    h.store
        .write("TSLA", &record_aged("TSLA", 4, now, ChronoDuration::hours(2)))
        .await
        .unwrap();
    h.store
        .write("MSFT", &record_aged("MSFT", 5, now, ChronoDuration::hours(30)))
        .await
        .unwrap();

    let stats = h.service.get_stats().await;
    assert_eq!(stats.total_keys, 5);
    assert_eq!(stats.cached_keys, 3);
    assert_eq!(stats.fresh_keys, 2);
    assert_eq!(stats.stale_keys, 1);
    assert_eq!(stats.total_items, 12);
    assert_eq!(stats.per_key["KO"].message, "No cached data found");
    assert_eq!(h.provider.total_calls(), 0);
}

#[tokio::test]
async fn concurrent_readers_share_one_refresh() {
    let h = harness();
    h.provider.set_items("KO", articles(2));
    h.provider.set_latency(Duration::from_millis(50));

    let options = ResolveOptions::news();
    let (a, b, c) = tokio::join!(
        h.service.get_one("KO", &options),
        h.service.get_one("ko", &options),
        h.service.get_one(" KO ", &options),
    );
    assert!(a.success && b.success && c.success);
    assert_eq!(h.provider.calls("KO"), 1);
}
