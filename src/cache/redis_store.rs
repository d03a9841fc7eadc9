//! Persistent store adapter backed by Redis.
//!
//! One JSON document per key under `{prefix}:{ticker}`; records never expire on
//! their own, staleness is decided by the reader.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::fmt;

use super::record::CacheRecord;
use super::store::CacheStore;
use crate::error::{CacheError, Result};

#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
    key_prefix: String,
    redis_url: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("redis_url", &self.redis_url)
            .field("key_prefix", &self.key_prefix)
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

impl RedisStore {
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self> {
        info!("Initializing Redis connection manager for URL: {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to create Redis ConnectionManager: {}", e);
            CacheError::StoreUnavailable(format!("Failed to create Redis ConnectionManager: {}", e))
        })?;
        info!("Redis ConnectionManager initialized. Key prefix: {}", key_prefix);
        Ok(Self {
            conn_manager,
            key_prefix: key_prefix.to_string(),
            redis_url: redis_url.to_string(),
        })
    }

    pub fn storage_key(prefix: &str, key: &str) -> String {
        format!("{}:{}", prefix, key.trim().to_lowercase())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn read(&self, key: &str) -> Result<Option<CacheRecord>> {
        let storage_key = Self::storage_key(&self.key_prefix, key);
        let mut conn = self.conn_manager.clone();
        match conn.get::<_, Option<String>>(&storage_key).await {
            Ok(Some(raw)) => {
                debug!("Cache HIT for key: {}", storage_key);
                CacheRecord::from_json(&raw).map(Some).map_err(|e| {
                    warn!("Failed to deserialize cached record for {}: {}", storage_key, e);
                    CacheError::from(e)
                })
            }
            Ok(None) => {
                debug!("Cache MISS for key: {}", storage_key);
                Ok(None)
            }
            Err(e) => {
                error!("Redis GET error for key {}: {}", storage_key, e);
                Err(e.into())
            }
        }
    }

    async fn write(&self, key: &str, record: &CacheRecord) -> Result<()> {
        let storage_key = Self::storage_key(&self.key_prefix, key);
        let raw = record.to_json()?;
        let mut conn = self.conn_manager.clone();
        conn.set::<_, _, ()>(&storage_key, raw).await.map_err(|e| {
            warn!("Failed to SET key '{}' in Redis: {}", storage_key, e);
            CacheError::from(e)
        })?;
        debug!("Cache SET success for key: {} ({} items)", storage_key, record.item_count);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let storage_key = Self::storage_key(&self.key_prefix, key);
        let mut conn = self.conn_manager.clone();
        match conn.del::<_, i32>(&storage_key).await {
            Ok(count) => Ok(count > 0),
            Err(e) => {
                error!("Redis DEL error for key {}: {}", storage_key, e);
                Err(e.into())
            }
        }
    }

    async fn is_available(&self) -> bool {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(reply) => reply == "PONG",
            Err(e) => {
                warn!("Redis PING failed: {}", e);
                false
            }
        }
    }
}
