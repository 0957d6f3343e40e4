//! ESP32-S3 firmware-specific modules for tempnode
//!
//! This crate contains the hardware-specific code that cannot compile on
//! desktop targets: the ADC supply monitor, the open-drain 1-Wire pin, RTC
//! deep sleep, the WiFi uplink, and the compiled-in credentials.

#![no_std]

pub mod config;
pub mod hardware;
pub mod network;
pub mod wifi_secrets;
