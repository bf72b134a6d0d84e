//! Wall-clock source and trading-calendar date normalization.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Offset of India Standard Time from UTC, in seconds (+05:30).
const IST_OFFSET_SECS: i64 = 5 * 3600 + 30 * 60;

/// Source of the current time for every timestamp the cache computes.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The host's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The trading day `now` falls on, in IST regardless of the host's locale.
pub fn trading_day(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::seconds(IST_OFFSET_SECS)).date_naive()
}

/// Today's date in IST according to `clock`.
pub fn today_ist(clock: &dyn Clock) -> NaiveDate {
    trading_day(clock.now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trading_day_rolls_over_at_ist_midnight() {
        // 18:29 UTC is 23:59 IST, 18:30 UTC is 00:00 IST the next day.
        let before = Utc.with_ymd_and_hms(2025, 1, 1, 18, 29, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 18, 30, 0).unwrap();
        assert_eq!(trading_day(before), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(trading_day(after), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 4, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let shared = clock.clone();
        shared.advance(Duration::minutes(9));
        assert_eq!(clock.now(), start + Duration::minutes(9));
        assert_eq!(today_ist(&clock), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }
}
