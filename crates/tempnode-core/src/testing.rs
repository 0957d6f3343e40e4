//! Test doubles for the wake cycle and the ready poll

use core::cell::{Cell, RefCell};

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use heapless::{String, Vec};

use crate::clock::Clock;
use crate::cycle::{DeepSleep, SupplyMonitor, Uplink};
use crate::measurement::{Millivolts, Temperature};
use crate::sensors::{SensorError, TemperatureProbe};
use crate::telemetry::RequestTarget;

/// Manually advanced clock, starting at zero.
#[derive(Debug, Default)]
pub struct FakeClock {
    micros: Cell<u64>,
}

impl FakeClock {
    pub fn advance(&self, by: Duration) {
        self.micros.set(self.micros.get() + by.as_micros());
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.micros.get())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.micros.get())
    }
}

/// Delay that returns at once and moves a [`FakeClock`] forward instead.
pub struct FakeDelay<'a> {
    clock: &'a FakeClock,
    pub calls: u32,
}

impl<'a> FakeDelay<'a> {
    pub fn new(clock: &'a FakeClock) -> Self {
        Self { clock, calls: 0 }
    }
}

impl DelayNs for FakeDelay<'_> {
    async fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.clock.advance(Duration::from_micros(u64::from(ns) / 1_000));
    }

    async fn delay_us(&mut self, us: u32) {
        self.calls += 1;
        self.clock.advance(Duration::from_micros(u64::from(us)));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.clock.advance(Duration::from_millis(u64::from(ms)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Supply,
    Locate,
    Configure,
    RequestConversion,
    ReadTemperature,
    Associate,
    HttpGet,
    Sleep,
}

/// Shared record of the order in which collaborators were called.
#[derive(Debug, Default)]
pub struct Journal {
    events: RefCell<Vec<Event, 32>>,
}

impl Journal {
    pub fn record(&self, event: Event) {
        self.events
            .borrow_mut()
            .push(event)
            .expect("journal full");
    }

    pub fn events(&self) -> Vec<Event, 32> {
        self.events.borrow().clone()
    }
}

fn record(journal: Option<&Journal>, event: Event) {
    if let Some(journal) = journal {
        journal.record(event);
    }
}

/// Probe whose conversion completes once the clock reaches `ready_at`.
pub struct FakeProbe<'a> {
    clock: &'a FakeClock,
    journal: Option<&'a Journal>,
    ready_at: Option<Duration>,
    temperature: Temperature,
    pub checks: u32,
    pub locate_error: Option<SensorError>,
    pub configure_error: Option<SensorError>,
    pub request_error: Option<SensorError>,
    pub status_error: Option<SensorError>,
}

impl<'a> FakeProbe<'a> {
    pub fn ready_after(clock: &'a FakeClock, ready_at: Duration) -> Self {
        Self {
            clock,
            journal: None,
            ready_at: Some(ready_at),
            temperature: Temperature(20.0),
            checks: 0,
            locate_error: None,
            configure_error: None,
            request_error: None,
            status_error: None,
        }
    }

    pub fn never_ready(clock: &'a FakeClock) -> Self {
        Self {
            ready_at: None,
            ..Self::ready_after(clock, Duration::from_ticks(0))
        }
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn reading(mut self, temperature: Temperature) -> Self {
        self.temperature = temperature;
        self
    }

    fn step(&self, event: Event, error: Option<SensorError>) -> Result<(), SensorError> {
        record(self.journal, event);
        error.map_or(Ok(()), Err)
    }
}

impl TemperatureProbe for FakeProbe<'_> {
    async fn locate(&mut self) -> Result<(), SensorError> {
        self.step(Event::Locate, self.locate_error)
    }

    async fn configure(&mut self) -> Result<(), SensorError> {
        self.step(Event::Configure, self.configure_error)
    }

    async fn request_conversion(&mut self) -> Result<(), SensorError> {
        self.step(Event::RequestConversion, self.request_error)
    }

    async fn is_conversion_complete(&mut self) -> Result<bool, SensorError> {
        self.checks += 1;
        if let Some(error) = self.status_error {
            return Err(error);
        }
        Ok(self
            .ready_at
            .is_some_and(|ready_at| self.clock.elapsed() >= ready_at))
    }

    async fn read_temperature(&mut self) -> Temperature {
        record(self.journal, Event::ReadTemperature);
        self.temperature
    }
}

pub struct FakeSupply<'a> {
    millivolts: u16,
    journal: &'a Journal,
}

impl<'a> FakeSupply<'a> {
    pub fn new(millivolts: u16, journal: &'a Journal) -> Self {
        Self {
            millivolts,
            journal,
        }
    }
}

impl SupplyMonitor for FakeSupply<'_> {
    fn read_supply(&mut self) -> Millivolts {
        self.journal.record(Event::Supply);
        Millivolts(self.millivolts)
    }
}

/// Uplink that takes `associate_time` to join and records every request
/// target it is asked to send.
pub struct FakeUplink<'a> {
    clock: &'a FakeClock,
    journal: &'a Journal,
    requests: Vec<RequestTarget, 4>,
    pub associate_time: Duration,
    pub fail_associate: bool,
    pub fail_get: bool,
    pub status: u16,
}

impl<'a> FakeUplink<'a> {
    pub fn new(clock: &'a FakeClock, journal: &'a Journal) -> Self {
        Self {
            clock,
            journal,
            requests: Vec::new(),
            associate_time: Duration::from_millis(500),
            fail_associate: false,
            fail_get: false,
            status: 200,
        }
    }

    pub fn requests(&self) -> &[RequestTarget] {
        &self.requests
    }
}

impl Uplink for FakeUplink<'_> {
    type Error = &'static str;

    async fn associate(&mut self, timeout: Duration) -> Result<(), Self::Error> {
        self.journal.record(Event::Associate);
        if self.fail_associate {
            self.clock.advance(timeout);
            return Err("association timed out");
        }
        self.clock.advance(self.associate_time);
        Ok(())
    }

    async fn get(&mut self, _host: &str, _port: u16, target: &str) -> Result<u16, Self::Error> {
        self.journal.record(Event::HttpGet);
        if self.fail_get {
            return Err("connection refused");
        }
        let target = String::try_from(target).map_err(|_| "request target too long")?;
        self.requests
            .push(target)
            .map_err(|_| "too many requests")?;
        Ok(self.status)
    }
}

pub struct FakeSleep<'a> {
    journal: &'a Journal,
    pub slept: Option<Duration>,
}

impl<'a> FakeSleep<'a> {
    pub fn new(journal: &'a Journal) -> Self {
        Self {
            journal,
            slept: None,
        }
    }
}

impl DeepSleep for FakeSleep<'_> {
    fn deep_sleep(&mut self, duration: Duration) {
        self.journal.record(Event::Sleep);
        self.slept = Some(duration);
    }
}
