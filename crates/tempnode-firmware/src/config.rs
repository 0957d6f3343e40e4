//! Board wiring and the compiled-in device configuration
//!
//! | signal      | pin    |
//! |-------------|--------|
//! | DS18B20 DQ  | GPIO4 (4.7 kΩ pull-up to 3V3) |
//! | VCC sense   | GPIO1 (1:2 divider from the battery rail) |

use tempnode_core::config::{Config, InternetConfig, TelemetryConfig};

use crate::wifi_secrets::{TS_API_KEY, TS_HOST, WIFI_PASSWORD, WIFI_SSID};

/// Ratio of the supply rail to the voltage seen by the ADC pin.
pub const SUPPLY_DIVIDER: u32 = 2;

pub fn device_config() -> Config<'static> {
    let defaults = TelemetryConfig::default();
    Config {
        internet: InternetConfig {
            ssid: WIFI_SSID,
            password: WIFI_PASSWORD,
        },
        telemetry: TelemetryConfig {
            host: TS_HOST.unwrap_or(defaults.host),
            api_key: TS_API_KEY,
            ..defaults
        },
        ..Config::default()
    }
}
