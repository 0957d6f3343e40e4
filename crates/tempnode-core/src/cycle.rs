//! The boot-measure-transmit-sleep wake cycle
//!
//! Each wake runs the sequence once and ends in deep sleep, which resets the
//! device. Any failure aborts the current cycle and goes straight to sleep;
//! the next wake starts from scratch.
//!
//! Hardware is passed in as owned handles behind the traits below, so the
//! whole sequence runs on the host against fakes.

use core::fmt::{self, Display, Write as _};

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use heapless::String;
use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::config::Config;
use crate::measurement::{Celsius, Millivolts, Temperature};
use crate::poll::PollError;
use crate::sensors::{SensorError, TemperatureProbe};
use crate::telemetry::{FormatError, TelemetryReport, Url};

/// Reads the device supply voltage.
pub trait SupplyMonitor {
    fn read_supply(&mut self) -> Millivolts;
}

/// WiFi association and the single telemetry request.
pub trait Uplink {
    type Error: Display;

    /// Joins the configured network. Must give up after `timeout`.
    fn associate(&mut self, timeout: Duration) -> impl Future<Output = Result<(), Self::Error>>;

    /// Sends `GET <target>` to `host:port` and returns the HTTP status code.
    fn get(
        &mut self,
        host: &str,
        port: u16,
        target: &str,
    ) -> impl Future<Output = Result<u16, Self::Error>>;
}

/// Enters deep sleep.
///
/// On hardware this never returns: the device resets on wake.
pub trait DeepSleep {
    fn deep_sleep(&mut self, duration: Duration);
}

/// Human-readable cause carried by errors from platform collaborators.
pub type Cause = String<64>;

fn cause(error: impl Display) -> Cause {
    let mut out = Cause::new();
    // Longer messages are cut off; the full text has already been logged.
    let _ = write!(out, "{}", error);
    out
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    #[error("sensor address lookup failed: {0}")]
    AddressLookup(SensorError),
    #[error("setting sensor resolution failed: {0}")]
    Resolution(SensorError),
    #[error("conversion request failed: {0}")]
    ConversionRequest(SensorError),
    #[error("conversion not complete after {} ms", .waited.as_millis())]
    ConversionTimeout { waited: Duration },
    #[error("conversion status check failed: {0}")]
    ConversionStatus(SensorError),
    #[error("temperature reading {0} is not a valid measurement")]
    InvalidTemperature(Temperature),
    #[error("WiFi association failed: {0}")]
    WifiAssociation(Cause),
    #[error("formatting telemetry failed: {0}")]
    Format(#[from] FormatError),
    #[error("HTTP transport failed: {0}")]
    HttpTransport(Cause),
}

impl From<PollError> for CycleError {
    fn from(error: PollError) -> Self {
        match error {
            PollError::Timeout { waited } => Self::ConversionTimeout { waited },
            PollError::Probe(e) => Self::ConversionStatus(e),
        }
    }
}

/// What a successful cycle measured and sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutcome {
    pub supply: Millivolts,
    pub temperature: Celsius,
    pub status: u16,
    pub duration_ms: u64,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} °C, {} mV, HTTP {} after {} ms",
            self.temperature, self.supply, self.status, self.duration_ms
        )
    }
}

/// The owned handles one wake cycle works with.
pub struct WakeCycle<'a, S, P, U, C, D> {
    pub config: &'a Config<'a>,
    pub supply: S,
    pub probe: P,
    pub uplink: U,
    pub clock: C,
    pub delay: D,
}

impl<'a, S, P, U, C, D> WakeCycle<'a, S, P, U, C, D>
where
    S: SupplyMonitor,
    P: TemperatureProbe,
    U: Uplink,
    C: Clock,
    D: DelayNs,
{
    /// Runs one measurement cycle up to and including the telemetry request.
    ///
    /// The conversion is requested before WiFi association so both latencies
    /// overlap. A sensor setup failure therefore aborts before the radio is
    /// touched, and an association failure aborts before any request.
    pub async fn run(&mut self) -> Result<CycleOutcome, CycleError> {
        let start = self.clock.now();

        let supply = self.supply.read_supply();
        info!("Voltage {}", supply);

        info!("Init temperature sensor");
        self.probe
            .locate()
            .await
            .map_err(CycleError::AddressLookup)?;
        self.probe
            .configure()
            .await
            .map_err(CycleError::Resolution)?;
        self.probe
            .request_conversion()
            .await
            .map_err(CycleError::ConversionRequest)?;

        info!("Connecting WiFi {}", self.config.internet.ssid);
        self.uplink
            .associate(self.config.schedule.wifi_timeout)
            .await
            .map_err(|e| {
                error!("WiFi association failed: {}", e);
                CycleError::WifiAssociation(cause(e))
            })?;
        info!("WiFi connected");

        info!("Wait for temperature to be ready");
        let poll = self
            .config
            .schedule
            .poll
            .wait(&self.clock, &mut self.delay, &mut self.probe)
            .await;

        let (temperature, poll_error) = match poll {
            Ok(_) => {
                info!("Reading temperature");
                (self.probe.read_temperature().await, None)
            }
            Err(e) => {
                warn!("{}; treating sensor as disconnected", e);
                (Temperature::DISCONNECTED, Some(e))
            }
        };

        let Some(celsius) = temperature.valid() else {
            return Err(match poll_error {
                Some(e) => e.into(),
                None => CycleError::InvalidTemperature(temperature),
            });
        };
        info!("Temperature {}", celsius);

        let duration_ms = self
            .clock
            .now()
            .saturating_duration_since(start)
            .as_millis();
        let report = TelemetryReport {
            temperature: celsius,
            supply,
            duration_ms: self.config.telemetry.report_duration.then_some(duration_ms),
        };

        let telemetry = &self.config.telemetry;
        let target = report.request_target(telemetry.api_key)?;
        info!(
            "{}",
            Url {
                host: telemetry.host,
                port: telemetry.port,
                target: &target,
            }
        );

        let status = self
            .uplink
            .get(telemetry.host, telemetry.port, &target)
            .await
            .map_err(|e| {
                error!("[HTTP] GET... failed, error: {}", e);
                CycleError::HttpTransport(cause(e))
            })?;
        info!("[HTTP] GET... code: {}", status);

        Ok(CycleOutcome {
            supply,
            temperature: celsius,
            status,
            duration_ms,
        })
    }

    /// Runs the cycle, then enters deep sleep whatever the outcome.
    ///
    /// Returns only where sleeping returns (the simulator and tests).
    pub async fn wake<Z: DeepSleep>(
        &mut self,
        sleeper: &mut Z,
    ) -> Result<CycleOutcome, CycleError> {
        let result = self.run().await;

        match &result {
            Ok(outcome) if !outcome.is_success() => {
                warn!("Telemetry endpoint answered {}", outcome.status)
            }
            Ok(outcome) => info!("Cycle complete: {}", outcome),
            Err(e) => error!("Cycle aborted: {}", e),
        }

        let sleep = self.config.schedule.sleep;
        info!("Sleeping {} s", sleep.as_secs());
        sleeper.deep_sleep(sleep);

        result
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::config::TelemetryConfig;
    use crate::testing::{
        Event, FakeClock, FakeDelay, FakeProbe, FakeSleep, FakeSupply, FakeUplink, Journal,
    };

    fn config() -> Config<'static> {
        Config {
            telemetry: TelemetryConfig {
                api_key: "KEY",
                ..TelemetryConfig::default()
            },
            ..Config::default()
        }
    }

    struct Rig<'a> {
        cycle: WakeCycle<'a, FakeSupply<'a>, FakeProbe<'a>, FakeUplink<'a>, &'a FakeClock, FakeDelay<'a>>,
        sleep: FakeSleep<'a>,
    }

    fn rig<'a>(config: &'a Config<'a>, clock: &'a FakeClock, journal: &'a Journal) -> Rig<'a> {
        Rig {
            cycle: WakeCycle {
                config,
                supply: FakeSupply::new(3300, journal),
                probe: FakeProbe::ready_after(clock, Duration::from_millis(750))
                    .with_journal(journal)
                    .reading(Temperature(21.5)),
                uplink: FakeUplink::new(clock, journal),
                clock,
                delay: FakeDelay::new(clock),
            },
            sleep: FakeSleep::new(journal),
        }
    }

    #[test]
    fn test_successful_cycle_sends_report_and_sleeps() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);

        let outcome = block_on(rig.cycle.wake(&mut rig.sleep)).unwrap();

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.supply, Millivolts(3300));
        assert_eq!(outcome.temperature.get(), 21.5);
        assert_eq!(
            journal.events().as_slice(),
            &[
                Event::Supply,
                Event::Locate,
                Event::Configure,
                Event::RequestConversion,
                Event::Associate,
                Event::ReadTemperature,
                Event::HttpGet,
                Event::Sleep,
            ]
        );

        let requests = rig.cycle.uplink.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("/update?api_key=KEY&field1=21.50&field2=3300&field3="));
        assert_eq!(rig.sleep.slept, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_conversion_overlaps_wifi() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);
        // WiFi takes longer than the conversion, so no polling delay is needed.
        rig.cycle.uplink.associate_time = Duration::from_millis(1500);

        let outcome = block_on(rig.cycle.run()).unwrap();

        assert_eq!(rig.cycle.delay.calls, 0);
        assert_eq!(outcome.duration_ms, 1500);
    }

    #[test]
    fn test_duration_is_reported() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);
        rig.cycle.uplink.associate_time = Duration::from_millis(1200);

        block_on(rig.cycle.run()).unwrap();

        assert!(rig.cycle.uplink.requests()[0].ends_with("&field3=1200"));
    }

    #[test]
    fn test_duration_can_be_omitted() {
        let mut config = config();
        config.telemetry.report_duration = false;
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);

        block_on(rig.cycle.run()).unwrap();

        assert!(!rig.cycle.uplink.requests()[0].contains("field3"));
    }

    #[test]
    fn test_wifi_failure_never_sends_and_still_sleeps() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);
        rig.cycle.uplink.fail_associate = true;

        let err = block_on(rig.cycle.wake(&mut rig.sleep)).unwrap_err();

        assert!(matches!(err, CycleError::WifiAssociation(_)));
        assert!(rig.cycle.uplink.requests().is_empty());
        assert!(!journal.events().contains(&Event::HttpGet));
        assert_eq!(journal.events().last(), Some(&Event::Sleep));
    }

    #[test]
    fn test_http_failure_still_sleeps() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);
        rig.cycle.uplink.fail_get = true;

        let err = block_on(rig.cycle.wake(&mut rig.sleep)).unwrap_err();

        assert!(matches!(err, CycleError::HttpTransport(_)));
        let events = journal.events();
        assert_eq!(&events[events.len() - 2..], &[Event::HttpGet, Event::Sleep]);
    }

    #[test]
    fn test_error_status_is_not_an_error() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);
        rig.cycle.uplink.status = 400;

        let outcome = block_on(rig.cycle.wake(&mut rig.sleep)).unwrap();

        assert!(!outcome.is_success());
        assert_eq!(rig.sleep.slept, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_timeout_substitutes_sentinel_and_skips_read() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);
        rig.cycle.probe = FakeProbe::never_ready(&clock).with_journal(&journal);

        let err = block_on(rig.cycle.wake(&mut rig.sleep)).unwrap_err();

        assert_eq!(
            err,
            CycleError::ConversionTimeout {
                waited: Duration::from_secs(2)
            }
        );
        let events = journal.events();
        assert!(!events.contains(&Event::ReadTemperature));
        assert!(!events.contains(&Event::HttpGet));
        assert_eq!(events.last(), Some(&Event::Sleep));
    }

    #[test]
    fn test_sentinel_reading_is_never_sent() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);
        rig.cycle.probe = FakeProbe::ready_after(&clock, Duration::from_ticks(0))
            .with_journal(&journal)
            .reading(Temperature::DISCONNECTED);

        let err = block_on(rig.cycle.wake(&mut rig.sleep)).unwrap_err();

        assert_eq!(err, CycleError::InvalidTemperature(Temperature::DISCONNECTED));
        assert!(rig.cycle.uplink.requests().is_empty());
        assert_eq!(rig.sleep.slept, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_negative_temperature_is_sent() {
        let config = config();
        let clock = FakeClock::default();
        let journal = Journal::default();
        let mut rig = rig(&config, &clock, &journal);
        rig.cycle.probe = FakeProbe::ready_after(&clock, Duration::from_ticks(0))
            .with_journal(&journal)
            .reading(Temperature(-4.25));

        block_on(rig.cycle.run()).unwrap();

        assert!(rig.cycle.uplink.requests()[0].contains("field1=-4.25&"));
    }

    #[test]
    fn test_sensor_setup_failures_abort_before_wifi() {
        const FAILURE: SensorError = SensorError::NotPresent { sensor: "test" };
        let cases: [(fn(&mut FakeProbe<'_>), fn(&CycleError) -> bool); 3] = [
            (
                |p| p.locate_error = Some(FAILURE),
                |e| matches!(e, CycleError::AddressLookup(_)),
            ),
            (
                |p| p.configure_error = Some(FAILURE),
                |e| matches!(e, CycleError::Resolution(_)),
            ),
            (
                |p| p.request_error = Some(FAILURE),
                |e| matches!(e, CycleError::ConversionRequest(_)),
            ),
        ];

        for (inject, expected) in cases {
            let config = config();
            let clock = FakeClock::default();
            let journal = Journal::default();
            let mut rig = rig(&config, &clock, &journal);
            inject(&mut rig.cycle.probe);

            let err = block_on(rig.cycle.wake(&mut rig.sleep)).unwrap_err();

            assert!(expected(&err), "unexpected error {:?}", err);
            assert!(!journal.events().contains(&Event::Associate));
            assert_eq!(journal.events().last(), Some(&Event::Sleep));
        }
    }
}
