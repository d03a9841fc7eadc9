//! Cache record model and persisted layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One opaque payload item (a news article, a quote bundle, ...).
pub type Item = serde_json::Value;

/// The only thing stored per key. Writes always replace the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub key: String,
    pub items: Vec<Item>,
    pub item_count: usize,
    /// Time of the write that produced this record.
    pub last_updated: DateTime<Utc>,
}

impl CacheRecord {
    pub fn new(key: impl Into<String>, items: Vec<Item>, last_updated: DateTime<Utc>) -> Self {
        let item_count = items.len();
        Self {
            key: key.into(),
            items,
            item_count,
            last_updated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Provenance attached to a record at read time. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    FreshProvider,
    Cache,
    StaleCache,
    VolatileFallback,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::FreshProvider => "fresh_provider",
            DataSource::Cache => "cache",
            DataSource::StaleCache => "stale_cache",
            DataSource::VolatileFallback => "volatile_fallback",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const MAX_ID_STEM: usize = 50;

fn sanitize_id_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_ID_STEM)
        .collect()
}

/// Stable-ish id for an item: URL tail, then title, then symbol, then
/// position + time.
pub fn item_id(item: &Item, index: usize, now: DateTime<Utc>) -> String {
    if let Some(url) = item.get("url").and_then(|v| v.as_str()) {
        let tail = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
        return format!("{}_{}", sanitize_id_stem(tail), index);
    }
    if let Some(title) = item.get("title").and_then(|v| v.as_str()) {
        return format!("{}_{}", sanitize_id_stem(title), index);
    }
    if let Some(symbol) = item.get("symbol").and_then(|v| v.as_str()) {
        return format!("quote_{}_{}", sanitize_id_stem(symbol), index);
    }
    format!("article_{}_{}", index, now.timestamp_millis())
}

/// Annotates object items with `id`, `cached_at` and `ticker` before they are written.
/// Existing `id` fields are kept, other item shapes pass through untouched.
pub fn stamp_items(key: &str, items: Vec<Item>, now: DateTime<Utc>) -> Vec<Item> {
    let cached_at = Item::String(now.to_rfc3339());
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let id = item_id(&item, index, now);
            match item {
                Item::Object(mut map) => {
                    map.entry("id").or_insert_with(|| Item::String(id));
                    map.insert("cached_at".to_string(), cached_at.clone());
                    map.insert("ticker".to_string(), Item::String(key.to_string()));
                    Item::Object(map)
                }
                other => other,
            }
        })
        .collect()
}
