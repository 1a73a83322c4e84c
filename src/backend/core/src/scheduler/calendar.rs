//! Calendar contract: a time-domain exclusion predicate consulted when
//! computing trigger fire times (§3).

use chrono::{DateTime, Timelike, Utc};

/// Predicate excluding windows of time from firing.
pub trait Calendar: Send + Sync {
    fn is_time_excluded(&self, time: DateTime<Utc>) -> bool;
}

/// Excludes nothing; the default when a trigger names no calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCalendar;

impl Calendar for NoopCalendar {
    fn is_time_excluded(&self, _time: DateTime<Utc>) -> bool {
        false
    }
}

/// Excludes a daily `[start_hour, end_hour)` UTC window, e.g. a nightly
/// maintenance blackout.
#[derive(Debug, Clone, Copy)]
pub struct DailyExclusionCalendar {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl DailyExclusionCalendar {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
        }
    }
}

impl Calendar for DailyExclusionCalendar {
    fn is_time_excluded(&self, time: DateTime<Utc>) -> bool {
        let hour = time.hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            // Window wraps midnight.
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn noop_excludes_nothing() {
        assert!(!NoopCalendar.is_time_excluded(Utc::now()));
    }

    #[test]
    fn daily_exclusion_within_window() {
        let cal = DailyExclusionCalendar::new(2, 4);
        let excluded = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        let allowed = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert!(cal.is_time_excluded(excluded));
        assert!(!cal.is_time_excluded(allowed));
    }

    #[test]
    fn daily_exclusion_wraps_midnight() {
        let cal = DailyExclusionCalendar::new(22, 2);
        let excluded = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        let allowed = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(cal.is_time_excluded(excluded));
        assert!(!cal.is_time_excluded(allowed));
    }
}
