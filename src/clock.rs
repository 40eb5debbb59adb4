//! Wall clock sampling.
//!
//! The scheduler never reads the system time directly, it asks a [`Clock`] so
//! tests and simulations can move time by hand.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{Datelike, Days, Local, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::alarm::TimeOfDay;

pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local time of the host, as shown by the desktop clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<NaiveDateTime>>);

impl ManualClock {
    #[must_use]
    pub fn new(start: NaiveDateTime) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn set(&self, time: NaiveDateTime) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(by) = chrono::Duration::from_std(by) {
            let mut time = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What the matcher compares alarms against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSample {
    pub minute: TimeOfDay,
    pub weekday: Weekday,
}

impl From<NaiveDateTime> for TimeSample {
    fn from(now: NaiveDateTime) -> Self {
        // hour and minute are always in range, so the fallback is never taken
        let minute = TimeOfDay::new(now.hour() as u8, now.minute() as u8)
            .unwrap_or(TimeOfDay::MIDNIGHT);
        Self {
            minute,
            weekday: now.weekday(),
        }
    }
}

pub fn sample(clock: &impl Clock) -> TimeSample {
    TimeSample::from(clock.now())
}

/// Start of the day after `now`.
#[must_use]
pub fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    now.date()
        .checked_add_days(Days::new(1))
        .unwrap_or(now.date())
        .and_time(NaiveTime::MIN)
}

#[must_use]
pub fn until_next_midnight(now: NaiveDateTime) -> Duration {
    (next_midnight(now) - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn monday(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    #[test]
    fn samples_minute_and_weekday() {
        let sample = TimeSample::from(monday(7, 0, 42));
        assert_eq!(sample.minute, TimeOfDay::new(7, 0).unwrap());
        assert_eq!(sample.weekday, Weekday::Mon);
    }

    #[test]
    fn midnight_delta() {
        assert_eq!(
            until_next_midnight(monday(23, 59, 59)),
            Duration::from_secs(1)
        );
        assert_eq!(
            until_next_midnight(monday(0, 0, 0)),
            Duration::from_secs(24 * 60 * 60)
        );
        assert_eq!(next_midnight(monday(12, 0, 0)).weekday(), Weekday::Tue);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(monday(6, 59, 59));
        let view = clock.clone();
        clock.advance(Duration::from_secs(1));
        assert_eq!(sample(&view).minute, TimeOfDay::new(7, 0).unwrap());
    }
}
