//! Bit-banged 1-Wire bus master
//!
//! Drives a single open-drain GPIO with an external pull-up. Writing the pin
//! high releases the line; writing it low pulls the line to ground. Slot
//! timing uses a blocking delay because 1-Wire slots are only a few
//! microseconds wide and cannot tolerate an executor yield.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use thiserror_no_std::Error;

use crate::measurement::DeviceAddress;

/// ROM command: address a single device by its ROM code.
pub const MATCH_ROM: u8 = 0x55;
/// ROM command: address every device on the bus at once.
pub const SKIP_ROM: u8 = 0xCC;
/// ROM command: start a ROM search.
pub const SEARCH_ROM: u8 = 0xF0;

// Standard speed slot timings in microseconds.
const RESET_LOW_US: u32 = 480;
const PRESENCE_SAMPLE_US: u32 = 70;
const RESET_RECOVERY_US: u32 = 410;
const WRITE_ONE_LOW_US: u32 = 6;
const WRITE_ONE_RELEASE_US: u32 = 64;
const WRITE_ZERO_LOW_US: u32 = 60;
const WRITE_ZERO_RELEASE_US: u32 = 10;
const READ_LOW_US: u32 = 6;
const READ_SAMPLE_US: u32 = 9;
const READ_RELEASE_US: u32 = 55;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireError {
    #[error("1-Wire pin could not be driven or sampled")]
    Pin,
    #[error("1-Wire line is held low")]
    BusStuckLow,
}

/// Dallas/Maxim CRC8 (polynomial x^8 + x^5 + x^4 + 1, reflected).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Progress of a ROM search across calls to [`OneWire::search`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchState {
    rom: [u8; 8],
    last_discrepancy: u8,
    last_device: bool,
}

impl SearchState {
    pub const fn new() -> Self {
        Self {
            rom: [0; 8],
            last_discrepancy: 0,
            last_device: false,
        }
    }
}

pub struct OneWire<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> OneWire<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    /// Wraps an open-drain pin. The line is released immediately.
    pub fn new(pin: P, delay: D) -> Result<Self, OneWireError> {
        let mut bus = Self { pin, delay };
        bus.release()?;
        Ok(bus)
    }

    fn release(&mut self) -> Result<(), OneWireError> {
        self.pin.set_high().map_err(|_| OneWireError::Pin)
    }

    fn pull_low(&mut self) -> Result<(), OneWireError> {
        self.pin.set_low().map_err(|_| OneWireError::Pin)
    }

    fn sample(&mut self) -> Result<bool, OneWireError> {
        self.pin.is_high().map_err(|_| OneWireError::Pin)
    }

    /// Sends a reset pulse and returns `true` if at least one device answered
    /// with a presence pulse.
    pub fn reset(&mut self) -> Result<bool, OneWireError> {
        self.release()?;
        if !self.sample()? {
            return Err(OneWireError::BusStuckLow);
        }

        self.pull_low()?;
        self.delay.delay_us(RESET_LOW_US);
        self.release()?;
        self.delay.delay_us(PRESENCE_SAMPLE_US);
        let present = !self.sample()?;
        self.delay.delay_us(RESET_RECOVERY_US);

        Ok(present)
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), OneWireError> {
        let (low, release) = if bit {
            (WRITE_ONE_LOW_US, WRITE_ONE_RELEASE_US)
        } else {
            (WRITE_ZERO_LOW_US, WRITE_ZERO_RELEASE_US)
        };

        self.pull_low()?;
        self.delay.delay_us(low);
        self.release()?;
        self.delay.delay_us(release);
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, OneWireError> {
        self.pull_low()?;
        self.delay.delay_us(READ_LOW_US);
        self.release()?;
        self.delay.delay_us(READ_SAMPLE_US);
        let bit = self.sample()?;
        self.delay.delay_us(READ_RELEASE_US);
        Ok(bit)
    }

    /// Writes a byte, least significant bit first.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), OneWireError> {
        for i in 0..8 {
            self.write_bit(byte & (1 << i) != 0)?;
        }
        Ok(())
    }

    /// Reads a byte, least significant bit first.
    pub fn read_byte(&mut self) -> Result<u8, OneWireError> {
        let mut byte = 0u8;
        for i in 0..8 {
            if self.read_bit()? {
                byte |= 1 << i;
            }
        }
        Ok(byte)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), OneWireError> {
        bytes.iter().try_for_each(|&b| self.write_byte(b))
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), OneWireError> {
        for byte in buf.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    /// Addresses a single device. Must follow a successful [`reset`](Self::reset).
    pub fn select(&mut self, address: &DeviceAddress) -> Result<(), OneWireError> {
        self.write_byte(MATCH_ROM)?;
        self.write_bytes(address.as_bytes())
    }

    /// Addresses every device. Must follow a successful [`reset`](Self::reset).
    pub fn skip(&mut self) -> Result<(), OneWireError> {
        self.write_byte(SKIP_ROM)
    }

    /// Finds the next device on the bus, following the search algorithm from
    /// Maxim application note 187.
    ///
    /// Returns `Ok(None)` once every device has been reported, when nobody
    /// answers the reset, or when the collected ROM code fails its CRC.
    /// `state` is reset in those cases so a following call starts over.
    pub fn search(
        &mut self,
        state: &mut SearchState,
    ) -> Result<Option<DeviceAddress>, OneWireError> {
        if state.last_device {
            *state = SearchState::new();
            return Ok(None);
        }

        if !self.reset()? {
            *state = SearchState::new();
            return Ok(None);
        }

        self.write_byte(SEARCH_ROM)?;

        let mut last_zero = 0u8;
        for bit_number in 1..=64u8 {
            let index = usize::from((bit_number - 1) / 8);
            let mask = 1u8 << ((bit_number - 1) % 8);

            let id_bit = self.read_bit()?;
            let complement = self.read_bit()?;

            let direction = match (id_bit, complement) {
                (true, true) => {
                    // No device is participating any more.
                    *state = SearchState::new();
                    return Ok(None);
                }
                (bit, cmp) if bit != cmp => bit,
                _ => {
                    let direction = if bit_number < state.last_discrepancy {
                        state.rom[index] & mask != 0
                    } else {
                        bit_number == state.last_discrepancy
                    };
                    if !direction {
                        last_zero = bit_number;
                    }
                    direction
                }
            };

            if direction {
                state.rom[index] |= mask;
            } else {
                state.rom[index] &= !mask;
            }
            self.write_bit(direction)?;
        }

        state.last_discrepancy = last_zero;
        state.last_device = last_zero == 0;

        let address = DeviceAddress(state.rom);
        if address.family() == 0 || !address.crc_valid() {
            *state = SearchState::new();
            return Ok(None);
        }

        Ok(Some(address))
    }
}
