//! Staleness policy.
//!
//! Staleness is decided at read time from `now - last_updated`; nothing about
//! freshness is written into a record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::CacheRecord;
use crate::clock::hours_between;

/// Default threshold for bulk/news reads.
pub const NEWS_MAX_AGE_HOURS: f64 = 6.0;

/// Default threshold for single-ticker profile and quote reads.
pub const PROFILE_MAX_AGE_HOURS: f64 = 24.0;

/// Caller-supplied thresholds below this are raised to it.
pub const MIN_MAX_AGE_HOURS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolveOptions {
    pub max_age_hours: f64,
    pub force_fresh: bool,
}

impl ResolveOptions {
    pub fn new(max_age_hours: f64, force_fresh: bool) -> Self {
        Self {
            max_age_hours,
            force_fresh,
        }
    }

    pub fn news() -> Self {
        Self::new(NEWS_MAX_AGE_HOURS, false)
    }

    pub fn profile() -> Self {
        Self::new(PROFILE_MAX_AGE_HOURS, false)
    }

    /// Options as they arrive on an inbound request: missing or non-finite
    /// thresholds use `default_hours`, anything else is floored at one hour.
    pub fn from_request(max_age_hours: Option<f64>, force_fresh: bool, default_hours: f64) -> Self {
        let max_age_hours = match max_age_hours {
            Some(hours) if hours.is_finite() => hours.max(MIN_MAX_AGE_HOURS),
            _ => default_hours,
        };
        Self::new(max_age_hours, force_fresh)
    }

    pub fn forced(mut self) -> Self {
        self.force_fresh = true;
        self
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::news()
    }
}

/// Classification of what a store read produced for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// No record, or a record with zero items.
    Missing,
    Stale,
    Fresh,
}

pub fn age_hours(record: &CacheRecord, now: DateTime<Utc>) -> f64 {
    hours_between(record.last_updated, now)
}

/// An age exactly equal to the threshold is stale.
pub fn is_stale_age(age_hours: f64, max_age_hours: f64) -> bool {
    age_hours >= max_age_hours
}

pub fn classify(record: Option<&CacheRecord>, now: DateTime<Utc>, max_age_hours: f64) -> Freshness {
    match record {
        None => Freshness::Missing,
        Some(record) if record.is_empty() => Freshness::Missing,
        Some(record) if is_stale_age(age_hours(record, now), max_age_hours) => Freshness::Stale,
        Some(_) => Freshness::Fresh,
    }
}

/// Like [`classify`], but `force_fresh` turns a fresh record stale.
pub fn classify_for_read(
    record: Option<&CacheRecord>,
    now: DateTime<Utc>,
    options: &ResolveOptions,
) -> Freshness {
    match classify(record, now, options.max_age_hours) {
        Freshness::Fresh if options.force_fresh => Freshness::Stale,
        other => other,
    }
}
