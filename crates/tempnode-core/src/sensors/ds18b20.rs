use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, warn};

use super::{SensorError, TemperatureProbe};
use crate::measurement::{DeviceAddress, Temperature};
use crate::onewire::{OneWire, OneWireError, SearchState, crc8};

const SENSOR: &str = "DS18B20";

/// ROM family code shared by every DS18B20.
pub const FAMILY_CODE: u8 = 0x28;

const CONVERT_T: u8 = 0x44;
const READ_SCRATCHPAD: u8 = 0xBE;
const WRITE_SCRATCHPAD: u8 = 0x4E;

const SCRATCHPAD_LEN: usize = 9;
const CONFIG_INDEX: usize = 4;

/// How the driver talks to the sensor on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Broadcast every command. Only valid with a single device on the bus.
    SkipRom,
    /// Find the first DS18B20 by ROM search and address it by its ROM code.
    Search,
}

/// Conversion resolution. Higher resolutions take longer to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    Bits12,
}

impl Resolution {
    pub const fn bits(self) -> u8 {
        match self {
            Self::Bits9 => 9,
            Self::Bits10 => 10,
            Self::Bits11 => 11,
            Self::Bits12 => 12,
        }
    }

    /// Configuration register value for this resolution.
    pub const fn config_byte(self) -> u8 {
        ((self.bits() - 9) << 5) | 0x1F
    }

    /// Worst-case conversion time from the datasheet.
    pub const fn conversion_time_ms(self) -> u32 {
        match self {
            Self::Bits9 => 94,
            Self::Bits10 => 188,
            Self::Bits11 => 375,
            Self::Bits12 => 750,
        }
    }

    /// Mask for the raw reading; low bits are undefined below 12 bits.
    const fn raw_mask(self) -> i16 {
        match self {
            Self::Bits9 => !0b111,
            Self::Bits10 => !0b11,
            Self::Bits11 => !0b1,
            Self::Bits12 => !0,
        }
    }
}

/// Converts the two temperature bytes of a scratchpad into degrees Celsius.
pub fn raw_to_celsius(lsb: u8, msb: u8, resolution: Resolution) -> f32 {
    let raw = i16::from_le_bytes([lsb, msb]) & resolution.raw_mask();
    f32::from(raw) / 16.0
}

pub struct Ds18b20<P, D> {
    bus: OneWire<P, D>,
    addressing: Addressing,
    resolution: Resolution,
    address: Option<DeviceAddress>,
}

impl<P, D> Ds18b20<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(bus: OneWire<P, D>, addressing: Addressing, resolution: Resolution) -> Self {
        Self {
            bus,
            addressing,
            resolution,
            address: None,
        }
    }

    /// ROM code of the sensor, once [`locate`](Self::locate) has found it.
    pub fn address(&self) -> Option<DeviceAddress> {
        self.address
    }

    fn bus_error(operation: &'static str) -> impl FnOnce(OneWireError) -> SensorError {
        move |error| SensorError::Bus {
            sensor: SENSOR,
            operation,
            error,
        }
    }

    /// With [`Addressing::Search`] this walks the ROM search until the first
    /// device with the DS18B20 family code; otherwise it only checks that
    /// something answers the reset pulse.
    fn find_sensor(&mut self) -> Result<(), SensorError> {
        match self.addressing {
            Addressing::SkipRom => {
                let present = self.bus.reset().map_err(Self::bus_error("presence check"))?;
                if !present {
                    return Err(SensorError::NotPresent { sensor: SENSOR });
                }
                Ok(())
            }
            Addressing::Search => {
                let mut state = SearchState::new();
                while let Some(address) = self
                    .bus
                    .search(&mut state)
                    .map_err(Self::bus_error("ROM search"))?
                {
                    if address.family() == FAMILY_CODE {
                        debug!("{} found at {}", SENSOR, address);
                        self.address = Some(address);
                        return Ok(());
                    }
                    debug!("Skipping 1-Wire device {}", address);
                }

                Err(SensorError::AddressNotFound {
                    sensor: SENSOR,
                    family: FAMILY_CODE,
                })
            }
        }
    }

    /// Resets the bus and addresses the sensor. Returns `false` when nobody
    /// answered the reset.
    fn address_sensor(&mut self) -> Result<bool, OneWireError> {
        if !self.bus.reset()? {
            return Ok(false);
        }
        match (self.addressing, self.address) {
            (Addressing::Search, Some(address)) => self.bus.select(&address)?,
            _ => self.bus.skip()?,
        }
        Ok(true)
    }

    /// Reads and CRC-checks the scratchpad. `None` if the sensor did not
    /// answer or the data is corrupt.
    fn read_scratchpad(&mut self) -> Result<Option<[u8; SCRATCHPAD_LEN]>, OneWireError> {
        if !self.address_sensor()? {
            return Ok(None);
        }
        self.bus.write_byte(READ_SCRATCHPAD)?;

        let mut scratchpad = [0u8; SCRATCHPAD_LEN];
        self.bus.read_bytes(&mut scratchpad)?;

        if scratchpad.iter().all(|&b| b == 0xFF) {
            debug!("{} scratchpad reads all ones, line is floating", SENSOR);
            return Ok(None);
        }
        if crc8(&scratchpad[..SCRATCHPAD_LEN - 1]) != scratchpad[SCRATCHPAD_LEN - 1] {
            warn!("{} scratchpad CRC mismatch", SENSOR);
            return Ok(None);
        }

        Ok(Some(scratchpad))
    }

    /// Writes the resolution into the configuration register, keeping the
    /// alarm thresholds, and reads it back to confirm.
    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), SensorError> {
        let failed = |details| SensorError::Resolution {
            sensor: SENSOR,
            bits: resolution.bits(),
            details,
        };

        let current = self
            .read_scratchpad()
            .map_err(Self::bus_error("scratchpad read"))?
            .ok_or_else(|| failed("scratchpad unreadable"))?;

        if current[CONFIG_INDEX] == resolution.config_byte() {
            self.resolution = resolution;
            return Ok(());
        }

        if !self
            .address_sensor()
            .map_err(Self::bus_error("scratchpad write"))?
        {
            return Err(failed("no presence pulse"));
        }
        self.bus
            .write_bytes(&[
                WRITE_SCRATCHPAD,
                current[2],
                current[3],
                resolution.config_byte(),
            ])
            .map_err(Self::bus_error("scratchpad write"))?;

        let written = self
            .read_scratchpad()
            .map_err(Self::bus_error("scratchpad verify"))?
            .ok_or_else(|| failed("scratchpad unreadable after write"))?;
        if written[CONFIG_INDEX] != resolution.config_byte() {
            return Err(failed("configuration register did not take the new value"));
        }

        self.resolution = resolution;
        Ok(())
    }
}

impl<P, D> TemperatureProbe for Ds18b20<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    async fn locate(&mut self) -> Result<(), SensorError> {
        self.find_sensor()
    }

    async fn configure(&mut self) -> Result<(), SensorError> {
        self.set_resolution(self.resolution)?;
        debug!(
            "{} ready at {} bits, conversion takes up to {} ms",
            SENSOR,
            self.resolution.bits(),
            self.resolution.conversion_time_ms()
        );
        Ok(())
    }

    async fn request_conversion(&mut self) -> Result<(), SensorError> {
        let present = self
            .address_sensor()
            .map_err(Self::bus_error("conversion request"))?;
        if !present {
            return Err(SensorError::ConversionRequest {
                sensor: SENSOR,
                details: "no presence pulse",
            });
        }
        self.bus
            .write_byte(CONVERT_T)
            .map_err(Self::bus_error("conversion request"))
    }

    async fn is_conversion_complete(&mut self) -> Result<bool, SensorError> {
        // The sensor holds read slots at zero while converting.
        self.bus
            .read_bit()
            .map_err(Self::bus_error("conversion status"))
    }

    async fn read_temperature(&mut self) -> Temperature {
        match self.read_scratchpad() {
            Ok(Some(scratchpad)) => Temperature(raw_to_celsius(
                scratchpad[0],
                scratchpad[1],
                self.resolution,
            )),
            Ok(None) => Temperature::DISCONNECTED,
            Err(e) => {
                warn!("{} read failed: {}", SENSOR, e);
                Temperature::DISCONNECTED
            }
        }
    }
}
