use crate::cache::freshness::{NEWS_MAX_AGE_HOURS, PROFILE_MAX_AGE_HOURS};
use crate::universe::DEFAULT_TICKERS;
use std::env;
use std::time::Duration;

pub const DEFAULT_RAPIDAPI_HOST: &str = "yahoo-finance15.p.rapidapi.com";
pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://yahoo-finance15.p.rapidapi.com";

#[derive(Clone)]
pub struct Config {
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub quote_key_prefix: String,
    pub store_timeout_ms: u64,
    pub rapidapi_key: Option<String>,
    pub rapidapi_host: String,
    pub provider_base_url: String,
    pub provider_timeout_ms: u64,
    pub news_max_age_hours: f64,
    pub profile_max_age_hours: f64,
    pub stats_max_age_hours: f64,
    pub refresh_batch_delay_ms: u64,
    pub fallback_batch_delay_ms: u64,
    pub refresh_hour_utc: u32,
    pub refresh_minute_utc: u32,
    pub scheduler_poll_secs: u64,
    pub sweep_timeout_secs: u64,
    pub supported_tickers: Vec<String>,
    pub log_level: String,
}

// The API key must never end up in the logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &self.redis_url)
            .field("redis_key_prefix", &self.redis_key_prefix)
            .field("quote_key_prefix", &self.quote_key_prefix)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("rapidapi_key", &self.rapidapi_key.as_ref().map(|_| "<redacted>"))
            .field("rapidapi_host", &self.rapidapi_host)
            .field("provider_base_url", &self.provider_base_url)
            .field("provider_timeout_ms", &self.provider_timeout_ms)
            .field("news_max_age_hours", &self.news_max_age_hours)
            .field("profile_max_age_hours", &self.profile_max_age_hours)
            .field("stats_max_age_hours", &self.stats_max_age_hours)
            .field("refresh_batch_delay_ms", &self.refresh_batch_delay_ms)
            .field("fallback_batch_delay_ms", &self.fallback_batch_delay_ms)
            .field("refresh_hour_utc", &self.refresh_hour_utc)
            .field("refresh_minute_utc", &self.refresh_minute_utc)
            .field("scheduler_poll_secs", &self.scheduler_poll_secs)
            .field("sweep_timeout_secs", &self.sweep_timeout_secs)
            .field("supported_tickers", &self.supported_tickers)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_key_prefix: "news".to_string(),
            quote_key_prefix: "stocks".to_string(),
            store_timeout_ms: 5_000,
            rapidapi_key: None,
            rapidapi_host: DEFAULT_RAPIDAPI_HOST.to_string(),
            provider_base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            provider_timeout_ms: 30_000,
            news_max_age_hours: NEWS_MAX_AGE_HOURS,
            profile_max_age_hours: PROFILE_MAX_AGE_HOURS,
            stats_max_age_hours: PROFILE_MAX_AGE_HOURS,
            refresh_batch_delay_ms: 2_000,
            fallback_batch_delay_ms: 800,
            refresh_hour_utc: 21,
            refresh_minute_utc: 0,
            scheduler_poll_secs: 60,
            sweep_timeout_secs: 1_800,
            supported_tickers: DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
            log_level: "info".to_string(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            redis_url: non_empty("REDIS_URL"),
            redis_key_prefix: non_empty("REDIS_KEY_PREFIX").unwrap_or(defaults.redis_key_prefix),
            quote_key_prefix: non_empty("QUOTE_KEY_PREFIX").unwrap_or(defaults.quote_key_prefix),
            store_timeout_ms: parse_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms),
            rapidapi_key: non_empty("RAPIDAPI_KEY"),
            rapidapi_host: non_empty("RAPIDAPI_HOST").unwrap_or(defaults.rapidapi_host),
            provider_base_url: non_empty("PROVIDER_BASE_URL").unwrap_or(defaults.provider_base_url),
            provider_timeout_ms: parse_or("PROVIDER_TIMEOUT_MS", defaults.provider_timeout_ms),
            news_max_age_hours: parse_or("NEWS_MAX_AGE_HOURS", defaults.news_max_age_hours),
            profile_max_age_hours: parse_or("PROFILE_MAX_AGE_HOURS", defaults.profile_max_age_hours),
            stats_max_age_hours: parse_or("STATS_MAX_AGE_HOURS", defaults.stats_max_age_hours),
            refresh_batch_delay_ms: parse_or("REFRESH_BATCH_DELAY_MS", defaults.refresh_batch_delay_ms),
            fallback_batch_delay_ms: parse_or(
                "FALLBACK_BATCH_DELAY_MS",
                defaults.fallback_batch_delay_ms,
            ),
            refresh_hour_utc: parse_or("REFRESH_HOUR_UTC", defaults.refresh_hour_utc),
            refresh_minute_utc: parse_or("REFRESH_MINUTE_UTC", defaults.refresh_minute_utc),
            scheduler_poll_secs: parse_or("SCHEDULER_POLL_SECS", defaults.scheduler_poll_secs),
            sweep_timeout_secs: parse_or("SWEEP_TIMEOUT_SECS", defaults.sweep_timeout_secs),
            supported_tickers: non_empty("SUPPORTED_TICKERS")
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_uppercase())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.supported_tickers),
            log_level: non_empty("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn refresh_batch_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_batch_delay_ms)
    }

    pub fn fallback_batch_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_batch_delay_ms)
    }

    pub fn scheduler_poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_poll_secs.max(1))
    }

    pub fn sweep_timeout(&self) -> Duration {
        Duration::from_secs(self.sweep_timeout_secs)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn validate_and_log(&self) {
        log::info!("Application Configuration Loaded: {:?}", self);
        if self.redis_url.is_none() {
            log::warn!("⚠️ REDIS_URL not set; cache records will live in process memory only");
        }
        if self.rapidapi_key.is_none() {
            log::warn!("⚠️ RAPIDAPI_KEY not set; provider refreshes will fail and only cached data is served");
        }
    }
}
