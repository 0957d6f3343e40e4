//! Bakes the WiFi and telemetry secrets from `.env` into the firmware.

const REQUIRED: [&str; 3] = ["WIFI_SSID", "WIFI_PASSWORD", "TS_API_KEY"];
const OPTIONAL: [&str; 1] = ["TS_HOST"];

fn main() {
    println!("cargo:rustc-link-arg-bins=-Tlinkall.x");

    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for key in REQUIRED {
        println!("cargo:rerun-if-env-changed={key}");
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) => panic!("{key} is not set; add it to .env or the build environment"),
        }
    }

    for key in OPTIONAL {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
