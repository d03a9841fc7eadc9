use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    /// Network, timeout or 5xx trouble talking to the upstream provider
    #[error("Provider Unavailable: {0}")]
    ProviderUnavailable(String),

    /// Upstream signalled a rate limit; the hint is kept for the scheduler
    #[error("Provider Rate Limited: {message}")]
    ProviderRateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Persistent store could not be reached at startup
    #[error("Store Unavailable: {0}")]
    StoreUnavailable(String),

    /// A single store read/write/delete failed
    #[error("Store Error: {0}")]
    Store(String),

    /// Provider answered successfully but with zero items
    #[error("Empty Result: {0}")]
    EmptyResult(String),

    #[error("Key Not Supported: {0}")]
    KeyNotSupported(String),

    #[error("Timeout Error: {0}")]
    Timeout(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("A refresh sweep is already in progress")]
    SweepInProgress,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Store(format!("Redis error: {}", err))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CacheError::Timeout(format!("Provider request timed out: {}", err))
        } else {
            CacheError::ProviderUnavailable(format!("Network Error: {}", err))
        }
    }
}

impl CacheError {
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            CacheError::ProviderRateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// Categorizes error for logging and status reports
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            CacheError::ProviderUnavailable(_)
            | CacheError::ProviderRateLimited { .. }
            | CacheError::Timeout(_) => ErrorCategory::Provider,
            CacheError::StoreUnavailable(_) | CacheError::Store(_) => ErrorCategory::Store,
            CacheError::EmptyResult(_) | CacheError::Serialization(_) => ErrorCategory::Data,
            CacheError::KeyNotSupported(_) => ErrorCategory::Request,
            CacheError::Config(_) => ErrorCategory::Configuration,
            CacheError::SweepInProgress => ErrorCategory::Scheduling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Provider,
    Store,
    Data,
    Request,
    Configuration,
    Scheduling,
}

pub type Result<T> = std::result::Result<T, CacheError>;
