//! In-process key → record table used when the persistent store is unreachable.
//!
//! Same read/write contract as the persistent adapter, no durability: records
//! disappear with the process.

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;

use super::record::CacheRecord;
use super::store::CacheStore;
use crate::error::Result;

#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    records: DashMap<String, CacheRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_name("memory")
    }

    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: DashMap::new(),
        }
    }

    fn slot(key: &str) -> String {
        key.trim().to_lowercase()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &str) -> Result<Option<CacheRecord>> {
        let record = self.records.get(&Self::slot(key)).map(|r| r.value().clone());
        debug!(
            "[{}] {} for {}",
            self.name,
            if record.is_some() { "HIT" } else { "MISS" },
            key
        );
        Ok(record)
    }

    async fn write(&self, key: &str, record: &CacheRecord) -> Result<()> {
        self.records.insert(Self::slot(key), record.clone());
        debug!("[{}] stored {} items for {}", self.name, record.item_count, key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.records.remove(&Self::slot(key)).is_some())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn write_replaces_whole_record() {
        let store = MemoryStore::new();
        let first = CacheRecord::new("AAPL", vec![json!(1), json!(2)], Utc::now());
        let second = CacheRecord::new("AAPL", vec![json!(3)], Utc::now());
        store.write("AAPL", &first).await.unwrap();
        store.write("aapl", &second).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.read("AAPL").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let store = MemoryStore::new();
        store
            .write("KO", &CacheRecord::new("KO", vec![json!(1)], Utc::now()))
            .await
            .unwrap();
        assert!(store.delete("ko").await.unwrap());
        assert!(!store.delete("KO").await.unwrap());
        assert!(store.read("KO").await.unwrap().is_none());
    }
}
