//! TSC clock for hot-path timing without syscalls.

use once_cell::sync::Lazy;
use quanta::Clock;
use std::time::Duration;

/// Global TSC clock
pub static CLOCK: Lazy<Clock> = Lazy::new(Clock::new);

/// Raw TSC reading, only meaningful relative to another reading
#[inline]
pub fn now_tsc() -> u64 {
    CLOCK.raw()
}

/// Wall time elapsed since a [`now_tsc`] reading
#[inline]
pub fn elapsed_since(start: u64) -> Duration {
    CLOCK.delta(start, CLOCK.raw())
}
