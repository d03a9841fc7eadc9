//! Store contract and the once-at-startup choice between persistent and volatile storage.

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::record::CacheRecord;
use crate::error::{CacheError, Result};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn read(&self, key: &str) -> Result<Option<CacheRecord>>;

    /// Full replacement of the record stored under `key`.
    async fn write(&self, key: &str, record: &CacheRecord) -> Result<()>;

    /// Returns whether a record was actually removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Liveness probe, consulted once when the active store is chosen.
    async fn is_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Persistent,
    Volatile,
}

/// The store every component talks to, fixed for the lifetime of the process.
#[derive(Clone)]
pub struct ActiveStore {
    store: Arc<dyn CacheStore>,
    kind: StoreKind,
    timeout: Duration,
}

impl std::fmt::Debug for ActiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveStore")
            .field("store", &self.store.name())
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ActiveStore {
    pub fn new(store: Arc<dyn CacheStore>, kind: StoreKind, timeout: Duration) -> Self {
        Self {
            store,
            kind,
            timeout,
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn is_volatile(&self) -> bool {
        self.kind == StoreKind::Volatile
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub async fn read(&self, key: &str) -> Result<Option<CacheRecord>> {
        with_timeout(self.timeout, format!("store read for {}", key), self.store.read(key)).await
    }

    pub async fn write(&self, key: &str, record: &CacheRecord) -> Result<()> {
        with_timeout(
            self.timeout,
            format!("store write for {}", key),
            self.store.write(key, record),
        )
        .await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        with_timeout(self.timeout, format!("store delete for {}", key), self.store.delete(key))
            .await
    }
}

/// Bounds a fallible future, mapping an elapsed deadline to [`CacheError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, what: String, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout(format!(
            "{} exceeded {}ms",
            what,
            limit.as_millis()
        ))),
    }
}

pub struct StoreSelector;

impl StoreSelector {
    /// Probes the persistent store once and returns the store for the rest of the
    /// process. An absent or unreachable persistent store selects `volatile`;
    /// that transition is logged here and nowhere else.
    pub async fn select(
        persistent: Option<Arc<dyn CacheStore>>,
        volatile: Arc<dyn CacheStore>,
        timeout: Duration,
    ) -> ActiveStore {
        let Some(store) = persistent else {
            warn!("⚠️ No persistent store configured. Using {} for this process", volatile.name());
            return ActiveStore::new(volatile, StoreKind::Volatile, timeout);
        };

        let available = tokio::time::timeout(timeout, store.is_available())
            .await
            .unwrap_or(false);

        if available {
            info!("✅ Persistent store {} is available", store.name());
            ActiveStore::new(store, StoreKind::Persistent, timeout)
        } else {
            warn!(
                "⚠️ Persistent store {} is unavailable ({}). Using {} for this process",
                store.name(),
                CacheError::StoreUnavailable(format!("liveness probe failed for {}", store.name())),
                volatile.name()
            );
            ActiveStore::new(volatile, StoreKind::Volatile, timeout)
        }
    }
}
