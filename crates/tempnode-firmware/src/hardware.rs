//! ESP32-S3 implementations of the wake-cycle hardware handles
//!
//! - [`AdcSupply`]: battery rail through a resistor divider on ADC1
//! - [`OneWirePin`]: open-drain GPIO for the 1-Wire bus
//! - [`RtcSleep`]: RTC timer deep sleep

use core::convert::Infallible;

use embassy_time::Duration;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::gpio::{DriveMode, Flex, InputConfig, OutputConfig, Pull};
use esp_hal::peripherals::{ADC1, GPIO1};
use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;
use log::debug;
use tempnode_core::cycle::{DeepSleep, SupplyMonitor};
use tempnode_core::measurement::Millivolts;

use crate::config::SUPPLY_DIVIDER;

/// Pin voltage at full scale with 11 dB attenuation.
const ADC_FULL_SCALE_MV: u32 = 3100;
const ADC_MAX_RAW: u16 = 4095;

pub struct AdcSupply<'d> {
    adc: Adc<'d, ADC1<'d>, Blocking>,
    pin: AdcPin<GPIO1<'d>, ADC1<'d>>,
}

impl<'d> AdcSupply<'d> {
    pub fn new(adc: ADC1<'d>, pin: GPIO1<'d>) -> Self {
        let mut config = AdcConfig::new();
        let pin = config.enable_pin(pin, Attenuation::_11dB);
        Self {
            adc: Adc::new(adc, config),
            pin,
        }
    }
}

impl SupplyMonitor for AdcSupply<'_> {
    fn read_supply(&mut self) -> Millivolts {
        // One-shot conversions finish within a few microseconds.
        let raw = loop {
            if let Ok(raw) = self.adc.read_oneshot(&mut self.pin) {
                break raw;
            }
            core::hint::spin_loop();
        };
        debug!("Supply ADC raw {}", raw);
        Millivolts::from_adc(raw, ADC_MAX_RAW, ADC_FULL_SCALE_MV, SUPPLY_DIVIDER)
    }
}

/// A GPIO driven open-drain with the input buffer left enabled, so the
/// line can be sampled while it is released.
pub struct OneWirePin<'d> {
    pin: Flex<'d>,
}

impl<'d> OneWirePin<'d> {
    pub fn new(mut pin: Flex<'d>) -> Self {
        pin.apply_input_config(&InputConfig::default().with_pull(Pull::Up));
        pin.apply_output_config(
            &OutputConfig::default()
                .with_drive_mode(DriveMode::OpenDrain)
                .with_pull(Pull::Up),
        );
        pin.set_high();
        pin.set_input_enable(true);
        pin.set_output_enable(true);
        Self { pin }
    }
}

impl ErrorType for OneWirePin<'_> {
    type Error = Infallible;
}

impl InputPin for OneWirePin<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.pin.is_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.pin.is_low())
    }
}

impl OutputPin for OneWirePin<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.pin.set_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.pin.set_high();
        Ok(())
    }
}

pub struct RtcSleep<'d> {
    rtc: Rtc<'d>,
}

impl<'d> RtcSleep<'d> {
    pub fn new(rtc: Rtc<'d>) -> Self {
        Self { rtc }
    }
}

impl DeepSleep for RtcSleep<'_> {
    /// Never returns: the chip resets when the timer fires.
    fn deep_sleep(&mut self, duration: Duration) {
        let timer = TimerWakeupSource::new(core::time::Duration::from_micros(duration.as_micros()));
        self.rtc.sleep_deep(&[&timer]);
    }
}
