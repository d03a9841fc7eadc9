//! Fakes for exercising the cache without network or Redis.
//!
//! - `MockProvider`: scripted per-ticker responses with call counting
//! - `ManualClock`: a clock tests move by hand
//! - `UnavailableStore`: a persistent store that is always down
//! - `StallingStore`: a store whose reads never answer

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use dashmap::DashMap;
use log::debug;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::cache::record::{CacheRecord, Item};
use crate::cache::store::CacheStore;
use crate::clock::Clock;
use crate::error::{CacheError, Result};
use crate::provider::ProviderClient;
use crate::universe::normalize_key;

/// Installs `env_logger` for test output. Safe to call from every test.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `count` distinct news-like articles.
pub fn articles(count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| {
            json!({
                "title": format!("Headline {}", i),
                "url": format!("https://news.example.com/story-{}", i),
                "source": "Mock Wire",
            })
        })
        .collect()
}

/// A record for `key` written `age` before `now`.
pub fn record_aged(key: &str, items: usize, now: DateTime<Utc>, age: ChronoDuration) -> CacheRecord {
    CacheRecord::new(normalize_key(key), articles(items), now - age)
}

/// Provider whose answer per ticker is set up front. Unscripted tickers
/// fail as unavailable.
#[derive(Debug, Default)]
pub struct MockProvider {
    responses: DashMap<String, std::result::Result<Vec<Item>, CacheError>>,
    queued: DashMap<String, VecDeque<std::result::Result<Vec<Item>, CacheError>>>,
    calls: DashMap<String, usize>,
    total: AtomicUsize,
    latency: RwLock<Duration>,
    key_latency: DashMap<String, Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items(&self, key: &str, items: Vec<Item>) {
        self.responses.insert(normalize_key(key), Ok(items));
    }

    pub fn set_error(&self, key: &str, err: CacheError) {
        self.responses.insert(normalize_key(key), Err(err));
    }

    /// Answers the next call for `key` with `err`, then falls back to the
    /// standing response.
    pub fn fail_next(&self, key: &str, err: CacheError) {
        self.queued.entry(normalize_key(key)).or_default().push_back(Err(err));
    }

    /// Delay applied to every call before it answers.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut guard) = self.latency.write() {
            *guard = latency;
        }
    }

    /// Delay for one key only, overriding `set_latency`.
    pub fn set_key_latency(&self, key: &str, latency: Duration) {
        self.key_latency.insert(normalize_key(key), latency);
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.get(&normalize_key(key)).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_one(&self, key: &str) -> std::result::Result<Vec<Item>, CacheError> {
        let key = normalize_key(key);
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.entry(key.clone()).or_insert(0) += 1;

        let latency = match self.key_latency.get(&key) {
            Some(latency) => *latency,
            None => self.latency.read().map(|l| *l).unwrap_or_default(),
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        debug!("🧪 Mock provider answering for {}", key);
        if let Some(queued) = self.queued.get_mut(&key).and_then(|mut q| q.pop_front()) {
            return queued;
        }
        match self.responses.get(&key) {
            Some(response) => response.value().clone(),
            None => Err(CacheError::ProviderUnavailable(format!("no scripted response for {}", key))),
        }
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        if let Ok(mut guard) = self.now.write() {
            *guard = *guard + by;
        }
    }
}

impl Default for ManualClock {
    /// 2024-05-01 12:00:00 UTC.
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|n| *n).unwrap_or_else(|_| Utc::now())
    }
}

/// Persistent store that fails its probe and every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn read(&self, key: &str) -> Result<Option<CacheRecord>> {
        Err(CacheError::StoreUnavailable(format!("cannot read {}", key)))
    }

    async fn write(&self, key: &str, _record: &CacheRecord) -> Result<()> {
        Err(CacheError::StoreUnavailable(format!("cannot write {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Err(CacheError::StoreUnavailable(format!("cannot delete {}", key)))
    }

    async fn is_available(&self) -> bool {
        false
    }
}

/// Store whose reads hang far past any call timeout. Writes and deletes go
/// to the wrapped store.
#[derive(Clone)]
pub struct StallingStore {
    inner: Arc<dyn CacheStore>,
    stall: Duration,
}

impl StallingStore {
    pub fn new(inner: Arc<dyn CacheStore>, stall: Duration) -> Self {
        Self { inner, stall }
    }
}

#[async_trait]
impl CacheStore for StallingStore {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn read(&self, key: &str) -> Result<Option<CacheRecord>> {
        tokio::time::sleep(self.stall).await;
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, record: &CacheRecord) -> Result<()> {
        self.inner.write(key, record).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }
}
