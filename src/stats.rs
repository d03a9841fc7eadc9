//! Cache statistics, derived on demand from the records themselves.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cache::freshness::{age_hours, classify, Freshness};
use crate::cache::record::CacheRecord;
use crate::cache::store::StoreKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStatus {
    pub exists: bool,
    pub fresh: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub age_hours: Option<f64>,
    pub item_count: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KeyStatus {
    pub fn from_record(record: Option<&CacheRecord>, now: DateTime<Utc>, max_age_hours: f64) -> Self {
        let freshness = classify(record, now, max_age_hours);
        match record {
            None => Self::absent("No cached data found"),
            Some(_) if freshness == Freshness::Missing => Self {
                last_updated: record.map(|r| r.last_updated),
                ..Self::absent("Cached record has no items")
            },
            Some(record) => {
                let age = age_hours(record, now);
                let fresh = freshness == Freshness::Fresh;
                Self {
                    exists: true,
                    fresh,
                    last_updated: Some(record.last_updated),
                    age_hours: Some(age),
                    item_count: record.item_count,
                    message: if fresh {
                        "Cache is fresh".to_string()
                    } else {
                        format!("Cache is stale ({:.1} hours old)", age)
                    },
                    error: None,
                }
            }
        }
    }

    pub fn read_failed(error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::absent("Error checking cache")
        }
    }

    fn absent(message: &str) -> Self {
        Self {
            exists: false,
            fresh: false,
            last_updated: None,
            age_hours: None,
            item_count: 0,
            message: message.to_string(),
            error: None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.exists && !self.fresh
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_keys: usize,
    pub cached_keys: usize,
    pub fresh_keys: usize,
    pub stale_keys: usize,
    pub total_items: usize,
    pub max_age_hours: f64,
    pub store_kind: StoreKind,
    pub per_key: BTreeMap<String, KeyStatus>,
    pub generated_at: DateTime<Utc>,
}

impl CacheStats {
    /// Aggregates per-key statuses; `total_items` sums cached keys only.
    pub fn aggregate(
        per_key: BTreeMap<String, KeyStatus>,
        max_age_hours: f64,
        store_kind: StoreKind,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let cached: Vec<&KeyStatus> = per_key.values().filter(|s| s.exists).collect();
        Self {
            total_keys: per_key.len(),
            cached_keys: cached.len(),
            fresh_keys: cached.iter().filter(|s| s.fresh).count(),
            stale_keys: cached.iter().filter(|s| !s.fresh).count(),
            total_items: cached.iter().map(|s| s.item_count).sum(),
            max_age_hours,
            store_kind,
            per_key,
            generated_at,
        }
    }

    pub fn missing_keys(&self) -> usize {
        self.total_keys - self.cached_keys
    }

    pub fn stale_or_missing(&self) -> Vec<String> {
        self.per_key
            .iter()
            .filter(|(_, s)| !s.fresh)
            .map(|(k, _)| k.clone())
            .collect()
    }
}
