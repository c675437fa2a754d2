use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Twitter epoch: Thursday, November 4, 2010 1:42:54.657 UTC
pub const TWITTER_EPOCH: Duration = Duration::from_millis(1_288_834_974_657);

/// A trait for time sources that return a wall-clock timestamp.
///
/// This abstraction allows you to plug in the real system clock or a mocked
/// time source in tests. The unit is **milliseconds since the Unix epoch**;
/// the generator subtracts its own epoch before packing.
///
/// # Example
///
/// ```
/// use flurry::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

/// The operating system's wall clock.
///
/// Unlike a monotonic timer this clock follows NTP steps and manual
/// adjustments, which is exactly what lets the generator notice a rewind and
/// refuse to issue IDs until the clock has caught up again.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        // A clock before 1970 reads as 0, which any issued ID is ahead of and
        // therefore reports as a rewind.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_twitter_epoch() {
        let now = SystemClock.current_millis();
        assert!(now > TWITTER_EPOCH.as_millis() as u64);
    }

    #[test]
    fn shared_clock_delegates() {
        struct FixedTime;
        impl TimeSource for FixedTime {
            fn current_millis(&self) -> u64 {
                42
            }
        }

        let shared = Arc::new(FixedTime);
        assert_eq!(shared.current_millis(), 42);
        assert_eq!((&FixedTime).current_millis(), 42);
    }
}
