mod ds18b20;

use thiserror_no_std::Error;

use crate::measurement::Temperature;
use crate::onewire::OneWireError;

pub use ds18b20::{Addressing, Ds18b20, Resolution};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: no device answered on the bus")]
    NotPresent { sensor: &'static str },
    #[error("{sensor}: no device with family code {family:#04x} found during ROM search")]
    AddressNotFound { sensor: &'static str, family: u8 },
    #[error("{sensor}: could not set {bits}-bit resolution ({details})")]
    Resolution {
        sensor: &'static str,
        bits: u8,
        details: &'static str,
    },
    #[error("{sensor}: conversion request failed ({details})")]
    ConversionRequest {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: bus error during {operation}: {error}")]
    Bus {
        sensor: &'static str,
        operation: &'static str,
        error: OneWireError,
    },
}

/// A temperature sensor with a split conversion: request it, do something
/// else, then poll until the result can be read.
pub trait TemperatureProbe {
    /// Finds the sensor on its bus.
    fn locate(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Applies the sensor configuration (resolution). Call after
    /// [`locate`](Self::locate).
    fn configure(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Starts an asynchronous conversion and returns without waiting for it.
    fn request_conversion(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Checks whether the conversion started by
    /// [`request_conversion`](Self::request_conversion) has finished.
    fn is_conversion_complete(&mut self) -> impl Future<Output = Result<bool, SensorError>>;

    /// Reads the last converted value.
    ///
    /// Never fails: a sensor that cannot be read reports
    /// [`Temperature::DISCONNECTED`].
    fn read_temperature(&mut self) -> impl Future<Output = Temperature>;
}
