//! Time sources for expiration bookkeeping.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
///
/// Time only moves when [`ManualClock::advance`] or [`ManualClock::set`] is
/// called, which makes expiration windows testable without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `duration`, saturating at the maximum
    /// representable instant.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now = now
            .checked_add_signed(to_time_delta(duration))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Converts a std duration to a chrono delta, saturating on overflow.
pub(crate) fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn manual_clock_only_moves_when_told() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now(), start + TimeDelta::seconds(61));
    }

    #[rstest]
    fn manual_clock_set_overrides_time() {
        let clock = ManualClock::default();
        let target = DateTime::<Utc>::UNIX_EPOCH;
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[rstest]
    fn to_time_delta_saturates() {
        assert_eq!(to_time_delta(Duration::MAX), TimeDelta::MAX);
        assert_eq!(to_time_delta(Duration::from_millis(1500)), TimeDelta::milliseconds(1500));
    }
}
