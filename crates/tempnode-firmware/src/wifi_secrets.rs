//! Credentials compiled in by `build.rs`

pub const WIFI_SSID: &str = env!("WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

/// ThingSpeak write API key.
pub const TS_API_KEY: &str = env!("TS_API_KEY");
/// Overrides the default telemetry host when set.
pub const TS_HOST: Option<&str> = option_env!("TS_HOST");
