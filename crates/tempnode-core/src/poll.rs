//! Bounded wait for an asynchronous sensor conversion
//!
//! The conversion is requested before WiFi association so the two latencies
//! overlap. By the time the network is up the result is often ready, and this
//! poll only has to confirm it. When it is not, the poll checks the ready
//! flag at a fixed interval until a ceiling, then gives up.

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::debug;
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::sensors::{SensorError, TemperatureProbe};

/// Default delay between two ready checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Default number of poll iterations before giving up.
pub const DEFAULT_POLL_ITERATIONS: u32 = 200;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError {
    #[error("conversion not ready after {} ms", .waited.as_millis())]
    Timeout { waited: Duration },
    #[error("ready check failed: {0}")]
    Probe(#[from] SensorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPoll {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for ReadyPoll {
    fn default() -> Self {
        Self::with_iterations(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_ITERATIONS)
    }
}

impl ReadyPoll {
    pub const fn new(interval: Duration, ceiling: Duration) -> Self {
        Self { interval, ceiling }
    }

    /// Ceiling expressed as `iterations × interval`.
    pub fn with_iterations(interval: Duration, iterations: u32) -> Self {
        Self {
            interval,
            ceiling: interval * iterations,
        }
    }

    /// Waits until `probe` reports a finished conversion, or the ceiling is
    /// reached.
    ///
    /// The flag is checked immediately, then after every delay. Returns the
    /// time spent waiting. Fails with [`PollError::Timeout`] only once the
    /// wait has reached the ceiling. The wait is measured both by `clock` and
    /// by the sum of requested delays, whichever is larger, so a stalled clock
    /// cannot keep the loop running.
    pub async fn wait<C, D, P>(
        &self,
        clock: &C,
        delay: &mut D,
        probe: &mut P,
    ) -> Result<Duration, PollError>
    where
        C: Clock,
        D: DelayNs,
        P: TemperatureProbe,
    {
        let start = clock.now();
        let mut slept = Duration::from_ticks(0);

        loop {
            let waited = clock.now().saturating_duration_since(start).max(slept);

            if probe.is_conversion_complete().await? {
                debug!("Conversion ready after {} ms", waited.as_millis());
                return Ok(waited);
            }

            if waited >= self.ceiling {
                return Err(PollError::Timeout { waited });
            }

            // At least one tick, so a zero interval still makes progress.
            let step = self
                .interval
                .min(self.ceiling - waited)
                .max(Duration::from_ticks(1));
            delay.delay_us(step.as_micros() as u32).await;
            slept += step;
        }
    }
}
