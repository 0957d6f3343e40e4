//! Compiled-in device configuration
//!
//! The firmware fills this from build-time environment variables, the
//! simulator from its process environment. Nothing is read or written at
//! runtime on the device.

use embassy_time::Duration;

use crate::poll::ReadyPoll;
use crate::sensors::{Addressing, Resolution};

/// Telemetry endpoint used when no host is configured.
pub const DEFAULT_TELEMETRY_HOST: &str = "api.thingspeak.com";
pub const DEFAULT_TELEMETRY_PORT: u16 = 80;
/// Time between two wake cycles.
pub const DEFAULT_SLEEP: Duration = Duration::from_secs(5 * 60);
/// Upper bound on WiFi association.
pub const DEFAULT_WIFI_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, Default)]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub telemetry: TelemetryConfig<'a>,
    pub schedule: ScheduleConfig,
    pub sensor: SensorConfig,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct TelemetryConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub api_key: &'a str,
    /// Send the cycle duration as `field3`.
    pub report_duration: bool,
}

impl Default for TelemetryConfig<'_> {
    fn default() -> Self {
        Self {
            host: DEFAULT_TELEMETRY_HOST,
            port: DEFAULT_TELEMETRY_PORT,
            api_key: "",
            report_duration: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub sleep: Duration,
    pub poll: ReadyPoll,
    pub wifi_timeout: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sleep: DEFAULT_SLEEP,
            poll: ReadyPoll::default(),
            wifi_timeout: DEFAULT_WIFI_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SensorConfig {
    pub addressing: Addressing,
    pub resolution: Resolution,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            addressing: Addressing::Search,
            resolution: Resolution::Bits12,
        }
    }
}
