//! Desktop simulator for the tempnode battery temperature logger.
//!
//! Runs complete wake cycles through `tempnode_core::cycle` against simulated
//! hardware: a draining battery, a DS18B20-like probe with real conversion
//! latency, a WiFi uplink that answers without touching the network, and a
//! deep sleep that only logs. Timing uses the embassy-time std driver, so the
//! conversion overlaps the simulated association the same way it does on the
//! device.
//!
//! # Environment
//!
//! | Variable         | Meaning                                        | Default        |
//! |------------------|------------------------------------------------|----------------|
//! | `WIFI_SSID`      | network name shown in the log                  | `simulated`    |
//! | `WIFI_PASSWORD`  | unused                                         | empty          |
//! | `TS_API_KEY`     | API key placed in the request target           | `SIMULATED`    |
//! | `TS_HOST`        | telemetry host shown in the log                | ThingSpeak     |
//! | `SIM_CYCLES`     | number of wake cycles to run                   | `3`            |
//! | `SIM_FAULT`      | `sensor`, `slow-sensor`, `wifi`, or `http`     | none           |
//!
//! `.env` in the working directory (or a parent) is loaded first.

use std::env;
use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};

use embassy_futures::block_on;
use embassy_time::{Delay, Duration, Instant, Timer};
use log::{info, warn};

use tempnode_core::clock::SystemClock;
use tempnode_core::config::{Config, InternetConfig, TelemetryConfig};
use tempnode_core::cycle::{DeepSleep, SupplyMonitor, Uplink, WakeCycle};
use tempnode_core::measurement::{Millivolts, Temperature};
use tempnode_core::sensors::{Resolution, SensorError, TemperatureProbe};
use tempnode_core::telemetry::Url;

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const DEFAULT_CYCLES: u32 = 3;

/// Fully charged Li-ion cell.
const BATTERY_FULL_MV: u16 = 4150;

/// Rail drop per wake cycle, exaggerated so the trend is visible.
const BATTERY_DRAIN_MV: u16 = 15;

/// Time the simulated access point takes to associate and hand out a lease.
const ASSOCIATE_LATENCY: Duration = Duration::from_millis(400);

const SIM_SENSOR: &str = "SIM-DS18B20";

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    /// The probe never answers on the bus.
    Sensor,
    /// The conversion never completes, so the ready poll times out.
    SlowSensor,
    /// Association fails.
    Wifi,
    /// The telemetry request fails at the transport level.
    Http,
}

impl Fault {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "sensor" => Some(Self::Sensor),
            "slow-sensor" => Some(Self::SlowSensor),
            "wifi" => Some(Self::Wifi),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated hardware
// ---------------------------------------------------------------------------

struct SimSupply {
    millivolts: u16,
}

impl SupplyMonitor for SimSupply {
    fn read_supply(&mut self) -> Millivolts {
        Millivolts(self.millivolts)
    }
}

/// Probe whose conversion takes as long as a real DS18B20 at the configured
/// resolution.
struct SimProbe {
    resolution: Resolution,
    fault: Option<Fault>,
    /// Seconds since the epoch, drives the simulated room temperature.
    phase: f64,
    ready_at: Option<Instant>,
}

impl SimProbe {
    fn room_temperature(&self) -> f32 {
        let celsius = 21.0 + 2.5 * (self.phase / 3600.0).sin();
        // Quantize like the sensor does: 1/16 °C at 12 bits.
        let step = f64::from(1u16 << (12 - self.resolution.bits())) / 16.0;
        ((celsius / step).round() * step) as f32
    }
}

impl TemperatureProbe for SimProbe {
    async fn locate(&mut self) -> Result<(), SensorError> {
        if self.fault == Some(Fault::Sensor) {
            return Err(SensorError::NotPresent { sensor: SIM_SENSOR });
        }
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn request_conversion(&mut self) -> Result<(), SensorError> {
        let conversion = Duration::from_millis(u64::from(self.resolution.conversion_time_ms()));
        self.ready_at = match self.fault {
            Some(Fault::SlowSensor) => None,
            _ => Some(Instant::now() + conversion),
        };
        Ok(())
    }

    async fn is_conversion_complete(&mut self) -> Result<bool, SensorError> {
        Ok(self.ready_at.is_some_and(|at| Instant::now() >= at))
    }

    async fn read_temperature(&mut self) -> Temperature {
        match self.ready_at {
            Some(_) => Temperature(self.room_temperature()),
            None => Temperature::DISCONNECTED,
        }
    }
}

struct SimUplink {
    fault: Option<Fault>,
}

impl Uplink for SimUplink {
    type Error = &'static str;

    async fn associate(&mut self, timeout: Duration) -> Result<(), Self::Error> {
        if self.fault == Some(Fault::Wifi) {
            Timer::after(timeout.min(ASSOCIATE_LATENCY)).await;
            return Err("no access point answered");
        }
        Timer::after(ASSOCIATE_LATENCY).await;
        Ok(())
    }

    async fn get(&mut self, host: &str, port: u16, target: &str) -> Result<u16, Self::Error> {
        if self.fault == Some(Fault::Http) {
            return Err("connection refused");
        }
        info!("Simulated request to {}", Url { host, port, target });
        Ok(200)
    }
}

/// Deep sleep that returns at once; the next simulated wake starts
/// immediately.
#[derive(Default)]
struct SimSleep {
    total: Duration,
}

impl DeepSleep for SimSleep {
    fn deep_sleep(&mut self, duration: Duration) {
        self.total += duration;
        info!(
            "(simulated) deep sleep {} s, {} s asleep in total",
            duration.as_secs(),
            self.total.as_secs()
        );
    }
}

fn battery_after(wakes: u32) -> u16 {
    let drained = u32::from(BATTERY_DRAIN_MV).saturating_mul(wakes);
    u32::from(BATTERY_FULL_MV).saturating_sub(drained) as u16
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

struct Settings {
    ssid: String,
    password: String,
    api_key: String,
    host: Option<String>,
    cycles: u32,
    fault: Option<Fault>,
}

impl Settings {
    fn from_env() -> Self {
        let var = |key: &str| env::var(key).ok().filter(|v| !v.is_empty());

        let cycles = match var("SIM_CYCLES").map(|v| v.parse::<u32>()) {
            Some(Ok(cycles)) => cycles,
            Some(Err(e)) => {
                warn!("Ignoring SIM_CYCLES: {}", e);
                DEFAULT_CYCLES
            }
            None => DEFAULT_CYCLES,
        };

        let fault = var("SIM_FAULT").and_then(|v| {
            let fault = Fault::parse(&v);
            if fault.is_none() {
                warn!("Unknown SIM_FAULT {:?}", v);
            }
            fault
        });

        Self {
            ssid: var("WIFI_SSID").unwrap_or_else(|| "simulated".into()),
            password: var("WIFI_PASSWORD").unwrap_or_default(),
            api_key: var("TS_API_KEY").unwrap_or_else(|| "SIMULATED".into()),
            host: var("TS_HOST"),
            cycles,
            fault,
        }
    }

    fn config(&self) -> Config<'_> {
        let defaults = TelemetryConfig::default();
        Config {
            internet: InternetConfig {
                ssid: &self.ssid,
                password: &self.password,
            },
            telemetry: TelemetryConfig {
                host: self.host.as_deref().unwrap_or(defaults.host),
                api_key: &self.api_key,
                ..defaults
            },
            ..Config::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Ok(path) = dotenv {
        info!("Loaded {}", path.display());
    }

    let settings = Settings::from_env();
    let config = settings.config();
    if let Some(fault) = settings.fault {
        warn!("Injecting fault {:?}", fault);
    }

    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(StdDuration::ZERO)
        .as_secs_f64();

    let mut sleeper = SimSleep::default();
    let mut succeeded = 0;

    for wake in 0..settings.cycles {
        info!("=== Wake {} ===", wake + 1);

        let mut cycle = WakeCycle {
            config: &config,
            supply: SimSupply {
                millivolts: battery_after(wake),
            },
            probe: SimProbe {
                resolution: config.sensor.resolution,
                fault: settings.fault,
                phase: epoch + f64::from(wake) * config.schedule.sleep.as_secs() as f64,
                ready_at: None,
            },
            uplink: SimUplink {
                fault: settings.fault,
            },
            clock: SystemClock,
            delay: Delay,
        };

        if block_on(cycle.wake(&mut sleeper)).is_ok() {
            succeeded += 1;
        }
    }

    info!("{}/{} cycles sent a report", succeeded, settings.cycles);
}
