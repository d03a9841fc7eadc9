//! The single place where a key gets refreshed.
//!
//! On-demand reads, the daily sweep and manual triggers all land in
//! [`RefreshCoordinator::refresh_one`]. Concurrent refreshes of the same key
//! collapse onto one provider call.

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::record::{stamp_items, CacheRecord};
use crate::cache::store::ActiveStore;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CacheError, ErrorCategory};
use crate::provider::ProviderClient;
use crate::universe::KeyUniverse;

#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub key: String,
    pub success: bool,
    pub items_written: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// The record that was written, for read-your-write on the calling path.
    #[serde(skip)]
    pub record: Option<CacheRecord>,
}

impl RefreshOutcome {
    fn written(key: &str, record: CacheRecord, started: Instant) -> Self {
        Self {
            key: key.to_string(),
            success: true,
            items_written: record.item_count,
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
            error_category: None,
            retry_after_secs: None,
            record: Some(record),
        }
    }

    pub fn failed(key: &str, err: &CacheError, started: Instant) -> Self {
        Self {
            key: key.to_string(),
            success: false,
            items_written: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(err.to_string()),
            error_category: Some(err.categorize()),
            retry_after_secs: err.retry_after_secs(),
            record: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_keys: usize,
    pub successful_keys: usize,
    pub failed_keys: usize,
    /// Keys skipped because the overall sweep deadline passed.
    pub deadline_skipped: usize,
    pub outcomes: Vec<RefreshOutcome>,
}

impl BatchOutcome {
    pub fn any_success(&self) -> bool {
        self.successful_keys > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Refreshed {}/{} tickers successfully in {:.1} seconds",
            self.successful_keys,
            self.total_keys,
            self.duration_ms as f64 / 1000.0
        )
    }
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Bound on one provider call.
    pub provider_timeout: Duration,
    /// Pause between keys in a batch.
    pub batch_delay: Duration,
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider_timeout: config.provider_timeout(),
            batch_delay: config.refresh_batch_delay(),
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(30),
            batch_delay: Duration::from_millis(2_000),
        }
    }
}

struct CoordinatorInner {
    store: ActiveStore,
    provider: Arc<dyn ProviderClient>,
    universe: Arc<KeyUniverse>,
    clock: Arc<dyn Clock>,
    settings: RefreshSettings,
}

type InflightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
    inflight: Arc<DashMap<String, InflightRefresh>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: ActiveStore,
        provider: Arc<dyn ProviderClient>,
        universe: Arc<KeyUniverse>,
        clock: Arc<dyn Clock>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                provider,
                universe,
                clock,
                settings,
            }),
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn universe(&self) -> &KeyUniverse {
        &self.inner.universe
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.inner.settings
    }

    /// Number of keys with a refresh currently running.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Fetches one key from the provider and replaces its record on success.
    /// A caller arriving while the same key is already refreshing waits for
    /// that refresh instead of issuing another provider call.
    pub async fn refresh_one(&self, raw_key: &str) -> RefreshOutcome {
        let started = Instant::now();
        let key = match self.inner.universe.validate(raw_key) {
            Ok(key) => key,
            Err(err) => {
                warn!("🚫 Refusing refresh for {}: {}", raw_key, err);
                return RefreshOutcome::failed(raw_key, &err, started);
            }
        };

        let pending = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!("🔗 Joining in-flight refresh for {}", key);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let inner = Arc::clone(&self.inner);
                let inflight = Arc::clone(&self.inflight);
                let task_key = key.clone();
                let fut = async move {
                    let outcome = inner.refresh_uncoalesced(&task_key).await;
                    inflight.remove(&task_key);
                    outcome
                }
                .boxed()
                .shared();
                entry.insert(fut.clone());
                fut
            }
        };

        pending.await
    }

    /// Refreshes `keys` one after another with the configured pause between
    /// provider calls. Every key gets an outcome; an optional `deadline`
    /// bounds the whole batch and marks the keys it never reached.
    pub async fn refresh_all(&self, keys: &[String], deadline: Option<Duration>) -> BatchOutcome {
        let started_at = self.inner.clock.now();
        let started = Instant::now();
        let batch_id = uuid::Uuid::new_v4();
        info!(
            "🚀 [{}] Starting refresh for {} tickers: {}",
            batch_id,
            keys.len(),
            keys.join(", ")
        );

        let mut outcomes = Vec::with_capacity(keys.len());
        let mut deadline_skipped = 0;
        for (i, key) in keys.iter().enumerate() {
            if let Some(limit) = deadline {
                if started.elapsed() >= limit {
                    let err = CacheError::Timeout(format!(
                        "sweep deadline of {}s reached before {}",
                        limit.as_secs(),
                        key
                    ));
                    outcomes.push(RefreshOutcome::failed(key, &err, Instant::now()));
                    deadline_skipped += 1;
                    continue;
                }
            }

            outcomes.push(self.refresh_one(key).await);

            let delay = self.inner.settings.batch_delay;
            if i + 1 < keys.len() && !delay.is_zero() {
                debug!("⏳ Waiting {}ms before next request...", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }

        if deadline_skipped > 0 {
            warn!(
                "⏰ [{}] Sweep deadline reached, {} tickers were not refreshed",
                batch_id, deadline_skipped
            );
        }

        let successful_keys = outcomes.iter().filter(|o| o.success).count();
        let batch = BatchOutcome {
            started_at,
            finished_at: self.inner.clock.now(),
            duration_ms: started.elapsed().as_millis() as u64,
            total_keys: keys.len(),
            successful_keys,
            failed_keys: outcomes.len() - successful_keys,
            deadline_skipped,
            outcomes,
        };
        info!("✅ [{}] {}", batch_id, batch.summary());
        batch
    }
}

impl CoordinatorInner {
    async fn refresh_uncoalesced(&self, key: &str) -> RefreshOutcome {
        let started = Instant::now();
        let limit = self.settings.provider_timeout;

        let fetched = match tokio::time::timeout(limit, self.provider.fetch_one(key)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(format!(
                "provider call for {} exceeded {}ms",
                key,
                limit.as_millis()
            ))),
        };

        let items = match fetched {
            Ok(items) if items.is_empty() => {
                let err = CacheError::EmptyResult("no data returned".to_string());
                info!("📭 Provider returned no items for {}, keeping existing record", key);
                return RefreshOutcome::failed(key, &err, started);
            }
            Ok(items) => items,
            Err(err) => {
                match err.retry_after_secs() {
                    Some(secs) => warn!("🚦 Refresh for {} rate limited, retry after {}s", key, secs),
                    None => warn!("❌ Refresh for {} failed ({:?}): {}", key, err.categorize(), err),
                }
                return RefreshOutcome::failed(key, &err, started);
            }
        };

        let now = self.clock.now();
        let record = CacheRecord::new(key, stamp_items(key, items, now), now);
        if let Err(err) = self.store.write(key, &record).await {
            warn!("❌ Failed to store refreshed data for {} ({:?}): {}", key, err.categorize(), err);
            return RefreshOutcome::failed(key, &err, started);
        }

        info!("💾 Refreshed {} items for {} via {}", record.item_count, key, self.store.name());
        RefreshOutcome::written(key, record, started)
    }
}
