//! The kinds of per-ticker data the cache holds.
//!
//! Each dataset lives under its own store prefix, has its own provider
//! endpoint and reads against its own default threshold.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Article lists per ticker, read against the news threshold.
    #[default]
    News,
    /// One quote+chart bundle per ticker, read against the profile threshold.
    Quotes,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::News => "news",
            Dataset::Quotes => "quotes",
        }
    }

    /// Store key prefix for this dataset.
    pub fn key_prefix<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            Dataset::News => &config.redis_key_prefix,
            Dataset::Quotes => &config.quote_key_prefix,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datasets_use_separate_prefixes() {
        let config = Config::default();
        assert_eq!(Dataset::News.key_prefix(&config), "news");
        assert_eq!(Dataset::Quotes.key_prefix(&config), "stocks");
        assert_eq!(Dataset::default(), Dataset::News);
    }
}
