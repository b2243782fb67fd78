//! Common time/period helpers for vcu_core.

use std::time::{Duration, Instant};

use vcu_traits::Clock;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Cycle rate in Hz for a period in milliseconds; at least 1 Hz.
#[inline]
pub fn rate_hz(period_ms: u64) -> u64 {
    (MILLIS_PER_SEC / period_ms.max(1)).max(1)
}

/// Deadline-bounded wait: sleep in slices until `deadline`, never past it.
///
/// Returns how far past the deadline the clock already was when called
/// (zero when the deadline was met).
pub fn wait_until<C: Clock + ?Sized>(clock: &C, deadline: Instant) -> Duration {
    let now = clock.now();
    if now >= deadline {
        return now - deadline;
    }
    loop {
        let now = clock.now();
        if now >= deadline {
            return Duration::ZERO;
        }
        clock.sleep(deadline - now);
    }
}
