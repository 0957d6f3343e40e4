//! Time source used to measure wait spans and cycle duration

use embassy_time::Instant;

/// Source of the current instant.
///
/// Separated from the delay so the ready poll and the cycle duration can be
/// driven by a fake clock in tests.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> Instant {
        (**self).now()
    }
}
