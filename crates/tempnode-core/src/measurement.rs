//! Readings produced during a single wake cycle
//!
//! All values here are transient: deep sleep resets the device, so nothing in
//! this module outlives the cycle that produced it.

use core::fmt;

use crate::onewire::crc8;

/// Supply voltage in millivolts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Millivolts(pub u16);

impl Millivolts {
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Scales a raw ADC sample to the voltage ahead of a resistor divider.
    ///
    /// `full_scale_mv` is the pin voltage that reads as `max_raw`; `divider`
    /// is the rail-to-pin ratio. Samples above `max_raw` are clamped, and the
    /// result saturates at `u16::MAX`.
    pub fn from_adc(raw: u16, max_raw: u16, full_scale_mv: u32, divider: u32) -> Self {
        if max_raw == 0 {
            return Self(0);
        }
        let raw = u64::from(raw.min(max_raw));
        let pin_mv = raw * u64::from(full_scale_mv) / u64::from(max_raw);
        let rail_mv = (pin_mv * u64::from(divider)).min(u64::from(u16::MAX));
        Self(rail_mv as u16)
    }
}

impl fmt::Display for Millivolts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw temperature reading in degrees Celsius, as reported by a probe.
///
/// A probe that cannot produce a value reports [`Temperature::DISCONNECTED`]
/// instead of failing, the same convention the Dallas sensor libraries use.
/// Convert into [`Celsius`] before treating the value as a measurement.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Temperature(pub f32);

impl Temperature {
    /// Sentinel for "sensor disconnected/unavailable".
    pub const DISCONNECTED: Self = Self(-127.0);

    /// Lowest temperature the DS18B20 family can measure.
    pub const MIN_CELSIUS: f32 = -55.0;
    /// Highest temperature the DS18B20 family can measure.
    pub const MAX_CELSIUS: f32 = 125.0;

    pub fn is_disconnected(self) -> bool {
        self.0 == Self::DISCONNECTED.0
    }

    /// Returns the reading as a validated [`Celsius`], or `None` for the
    /// sentinel and for values outside the sensor's physical range.
    pub fn valid(self) -> Option<Celsius> {
        Celsius::new(self.0)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disconnected() {
            f.write_str("disconnected")
        } else {
            write!(f, "{:.2}", self.0)
        }
    }
}

/// A temperature that is known to be a real measurement.
///
/// The only way to build one is [`Celsius::new`], which rejects the
/// disconnected sentinel, non-finite values and anything outside
/// [`Temperature::MIN_CELSIUS`]..=[`Temperature::MAX_CELSIUS`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Celsius(f32);

impl Celsius {
    pub fn new(value: f32) -> Option<Self> {
        if value.is_finite()
            && value != Temperature::DISCONNECTED.0
            && (Temperature::MIN_CELSIUS..=Temperature::MAX_CELSIUS).contains(&value)
        {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn get(self) -> f32 {
        self.0
    }
}

impl fmt::Display for Celsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// 1-Wire ROM code: family code, 48-bit serial number, CRC8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceAddress(pub [u8; 8]);

impl DeviceAddress {
    pub const fn family(&self) -> u8 {
        self.0[0]
    }

    /// `true` when the trailing byte is the CRC8 of the first seven.
    pub fn crc_valid(&self) -> bool {
        crc8(&self.0[..7]) == self.0[7]
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}
