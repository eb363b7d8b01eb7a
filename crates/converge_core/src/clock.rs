//! Wall-clock abstraction.
//!
//! State records are stamped with the time they were last read from a
//! provider, and the planner compares that stamp against the configured
//! staleness threshold. Both go through [`Clock`] so tests can move time
//! without sleeping.

use std::time::{Duration, SystemTime};

// ─────────────────────────────────────────────────────────────────────────────
// Clock Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Source of the current wall-clock time.
///
/// # Example
///
/// ```
/// use std::time::SystemTime;
/// use converge_core::Clock;
///
/// /// A clock frozen at a fixed time.
/// struct FixedClock(SystemTime);
///
/// impl Clock for FixedClock {
///     fn now(&self) -> SystemTime {
///         self.0
///     }
/// }
///
/// let clock = FixedClock(SystemTime::UNIX_EPOCH);
/// assert_eq!(clock.now(), SystemTime::UNIX_EPOCH);
/// ```
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> SystemTime;

    /// Returns how long ago `earlier` was.
    ///
    /// A timestamp in the future (clock skew between runs) counts as zero.
    fn elapsed_since(&self, earlier: SystemTime) -> Duration {
        self.now().duration_since(earlier).unwrap_or(Duration::ZERO)
    }
}

/// Clock backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MockClock for Testing
// ─────────────────────────────────────────────────────────────────────────────

/// Clock with manually controlled time.
///
/// # Example
///
/// ```
/// use std::time::{Duration, SystemTime};
/// use converge_core::{Clock, MockClock};
///
/// let mock = MockClock::new(SystemTime::UNIX_EPOCH);
/// mock.advance(Duration::from_secs(60));
/// assert_eq!(mock.elapsed_since(SystemTime::UNIX_EPOCH), Duration::from_secs(60));
/// ```
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct MockClock {
    current: parking_lot::RwLock<SystemTime>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockClock {
    /// Creates a mock clock set to the given time.
    #[must_use]
    pub fn new(start: SystemTime) -> Self {
        Self {
            current: parking_lot::RwLock::new(start),
        }
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.current.write() += duration;
    }

    /// Sets the clock to a specific time.
    pub fn set(&self, time: SystemTime) {
        *self.current.write() = time;
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.current.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_tracks_wall_time() {
        let before = SystemTime::now();
        let now = SystemClock.now();
        let after = SystemTime::now();

        assert!(now >= before);
        assert!(now <= after);
    }

    #[test]
    fn mock_clock_advance() {
        let mock = MockClock::default();
        let initial = mock.now();

        mock.advance(Duration::from_secs(90));

        assert_eq!(mock.elapsed_since(initial), Duration::from_secs(90));
    }

    #[test]
    fn mock_clock_set() {
        let mock = MockClock::default();
        mock.set(SystemTime::UNIX_EPOCH);
        assert_eq!(mock.now(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn future_timestamp_counts_as_zero_elapsed() {
        let mock = MockClock::new(SystemTime::UNIX_EPOCH);
        let later = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        assert_eq!(mock.elapsed_since(later), Duration::ZERO);
    }
}
