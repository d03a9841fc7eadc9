//! The fixed set of tickers the cache manages.

use crate::error::CacheError;

pub const DEFAULT_TICKERS: &[&str] = &[
    "BAC", "ABBV", "NVO", "KO", "PLTR", "SMFG", "ASML", "BABA", "PM", "TMUS", "UNH", "GE", "AAPL",
    "GOOGL", "MSFT", "TSLA", "AMZN", "NVDA", "META", "JPM", "V", "WMT", "JNJ", "XOM", "PG",
];

/// Upper-cases and trims a raw ticker.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUniverse {
    keys: Vec<String>,
}

impl KeyUniverse {
    /// Builds a universe from raw tickers. Keys are normalised and de-duplicated,
    /// first occurrence wins the position.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for key in keys {
            let key = normalize_key(key.as_ref());
            if !key.is_empty() && !normalized.contains(&key) {
                normalized.push(key);
            }
        }
        Self { keys: normalized }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.keys.iter().any(|k| *k == key)
    }

    /// Normalises `raw` and checks membership.
    pub fn validate(&self, raw: &str) -> Result<String, CacheError> {
        let key = normalize_key(raw);
        if self.keys.contains(&key) {
            Ok(key)
        } else {
            Err(CacheError::KeyNotSupported(if key.is_empty() {
                raw.to_string()
            } else {
                key
            }))
        }
    }
}

impl Default for KeyUniverse {
    fn default() -> Self {
        Self::new(DEFAULT_TICKERS)
    }
}
