//! Hardware-independent core library for tempnode
//!
//! This crate contains all platform-agnostic logic for the tempnode battery
//! temperature logger: the reading data model, the 1-Wire bus and DS18B20
//! driver, the bounded sensor-ready poll, telemetry URL and HTTP formatting,
//! and the boot-measure-transmit-sleep wake cycle.
//!
//! It is `#![no_std]` so it compiles on both the ESP32-S3 target and desktop
//! hosts (for the simulator and tests).

#![no_std]

pub mod clock;
pub mod config;
pub mod cycle;
pub mod http;
pub mod measurement;
pub mod onewire;
pub mod poll;
pub mod sensors;
pub mod telemetry;

#[cfg(test)]
mod testing;
