pub mod settings;

pub use settings::Config;

use crate::error::CacheError;
use std::sync::Arc;

/// Loads `.env` (if present), reads the configuration from the environment and
/// rejects values the cache cannot run with. Logging is not set up yet at this
/// point; callers log the result with [`Config::validate_and_log`].
pub fn load_config() -> Result<Arc<Config>, CacheError> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    validate(&config)?;

    Ok(Arc::new(config))
}

pub fn validate(config: &Config) -> Result<(), CacheError> {
    if config.supported_tickers.is_empty() {
        return Err(CacheError::Config(
            "SUPPORTED_TICKERS cannot be empty".to_string(),
        ));
    }
    for (name, hours) in [
        ("NEWS_MAX_AGE_HOURS", config.news_max_age_hours),
        ("PROFILE_MAX_AGE_HOURS", config.profile_max_age_hours),
        ("STATS_MAX_AGE_HOURS", config.stats_max_age_hours),
    ] {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(CacheError::Config(format!(
                "{} must be a positive number of hours, got {}",
                name, hours
            )));
        }
    }
    if config.refresh_hour_utc > 23 || config.refresh_minute_utc > 59 {
        return Err(CacheError::Config(format!(
            "Invalid refresh time {:02}:{:02} UTC",
            config.refresh_hour_utc, config.refresh_minute_utc
        )));
    }
    if config.provider_base_url.is_empty() {
        return Err(CacheError::Config("PROVIDER_BASE_URL cannot be empty".to_string()));
    }
    Ok(())
}
