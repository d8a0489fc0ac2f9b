//! Time provider for the storage layer.
//!
//! All timestamps written by the stores come from a [`Clock`] so tests can
//! pin time and make age calculations deterministic.

use std::fmt;

use chrono::{DateTime, Utc};

/// Provides the current UTC time.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that always returns the instant it was frozen at.
#[derive(Debug, Clone, Copy)]
pub struct FrozenClock {
    instant: DateTime<Utc>,
}

impl FrozenClock {
    /// Freezes the clock at the given instant.
    #[must_use]
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let before = Utc::now();
        let observed = clock.now();
        let after = Utc::now();
        assert!(before <= observed && observed <= after);
    }

    #[test]
    fn test_frozen_clock_never_advances() {
        let instant = Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap();
        let clock = FrozenClock::at(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), instant);
    }
}
