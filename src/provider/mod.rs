//! Upstream market-data providers.

pub mod yahoo;

pub use yahoo::{YahooNewsClient, YahooQuoteClient};

use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;

use crate::cache::record::Item;
use crate::error::CacheError;

/// What one provider call produced for one key.
#[derive(Debug, Clone)]
pub struct ProviderFetch {
    pub key: String,
    pub result: Result<Vec<Item>, CacheError>,
}

impl ProviderFetch {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_one(&self, key: &str) -> Result<Vec<Item>, CacheError>;

    /// Sequential fetch with `delay` between calls. Each call is bounded by
    /// `call_timeout`; a key that runs over gets a timeout result and the
    /// batch moves on. Never fails as a whole.
    async fn fetch_many(&self, keys: &[String], delay: Duration, call_timeout: Duration) -> Vec<ProviderFetch> {
        info!("🔄 [{}] Starting batch fetch for {} keys", self.name(), keys.len());
        let mut results = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let result = match tokio::time::timeout(call_timeout, self.fetch_one(key)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("⏰ [{}] Fetch for {} exceeded {}ms", self.name(), key, call_timeout.as_millis());
                    Err(CacheError::Timeout(format!(
                        "provider call for {} exceeded {}ms",
                        key,
                        call_timeout.as_millis()
                    )))
                }
            };
            results.push(ProviderFetch {
                key: key.clone(),
                result,
            });
            if i + 1 < keys.len() && !delay.is_zero() {
                debug!("⏳ Waiting {}ms before next request...", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }
        info!(
            "✅ [{}] Batch fetch completed. {}/{} successful",
            self.name(),
            results.iter().filter(|r| r.is_success()).count(),
            results.len()
        );
        results
    }
}

/// Stand-in used when no provider credentials are configured. Every call
/// fails softly so readers still get whatever is cached.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredProvider;

#[async_trait]
impl ProviderClient for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn fetch_one(&self, key: &str) -> Result<Vec<Item>, CacheError> {
        Err(CacheError::ProviderUnavailable(format!(
            "no provider configured, cannot fetch {}",
            key
        )))
    }
}
