use std::time::{Duration, Instant};

/// Time source for cycle pacing and frame timestamps.
///
/// The core only ever asks for `now()` and for whole milliseconds since its
/// epoch; `sleep()` is how the runner waits out the rest of a cycle.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Whole milliseconds from `epoch` to now; 0 if `epoch` is in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let elapsed = self.now().saturating_duration_since(epoch);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d);
    }
}

/// Wall-clock `Instant` with a real thread sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::{Clock, Duration, Instant};

    /// Clock that stands still until a test moves it.
    ///
    /// Clones share the same time, so a test can keep one handle while the
    /// core owns another. `sleep` advances instead of blocking, which makes
    /// a paced run loop finish instantly.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        origin: Instant,
        elapsed_us: Arc<AtomicU64>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                elapsed_us: Arc::new(AtomicU64::new(0)),
            }
        }

        pub fn advance(&self, d: Duration) {
            let us = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
            // saturating add; fetch_update only fails if the closure returns None
            let _ = self
                .elapsed_us
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                    Some(cur.saturating_add(us))
                });
        }

        pub fn advance_ms(&self, ms: u64) {
            self.advance(Duration::from_millis(ms));
        }

        /// Jump to `d` after the origin, backwards included.
        pub fn rewind_to(&self, d: Duration) {
            let us = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
            self.elapsed_us.store(us, Ordering::Relaxed);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + Duration::from_micros(self.elapsed_us.load(Ordering::Relaxed))
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::ManualClock;
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new();
        let epoch = clock.now();
        assert_eq!(clock.ms_since(epoch), 0);
        clock.advance_ms(7);
        assert_eq!(clock.ms_since(epoch), 7);
        clock.sleep(Duration::from_millis(3));
        assert_eq!(clock.ms_since(epoch), 10);
    }

    #[test]
    fn clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        let epoch = a.now();
        b.advance(Duration::from_micros(5_500));
        assert_eq!(a.ms_since(epoch), 5);
    }

    #[test]
    fn ms_since_is_zero_for_a_future_epoch() {
        let clock = ManualClock::new();
        clock.advance_ms(50);
        let later = clock.now();
        clock.rewind_to(Duration::ZERO);
        assert_eq!(clock.ms_since(later), 0);
    }
}
