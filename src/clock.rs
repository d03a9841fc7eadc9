//! Wall-clock abstraction shared by the staleness policy and the scheduler.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Next occurrence of `hour:minute` UTC strictly after `now`.
/// When `now` is exactly on the slot the slot counts as passed.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let slot = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or_default();
    let today = now.date_naive().and_time(slot).and_utc();
    if now >= today {
        today + ChronoDuration::days(1)
    } else {
        today
    }
}

/// Hours elapsed between `then` and `now`, negative when `then` lies in the future.
pub fn hours_between(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / 3_600_000.0
}
