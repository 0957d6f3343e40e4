//! Telemetry report formatting
//!
//! Readings are sent as query parameters of a single GET request:
//!
//! ```text
//! /update?api_key=<key>&field1=<temp>&field2=<vcc>[&field3=<duration_ms>]
//! ```
//!
//! `core::fmt` never applies locale rules, so numbers render with `.` as the
//! decimal point and without digit grouping.

use core::fmt::{self, Write};

use heapless::String;
use thiserror_no_std::Error;

use crate::measurement::{Celsius, Millivolts};

/// Path of the update endpoint.
pub const UPDATE_PATH: &str = "/update";

/// Capacity of a formatted request target.
pub const REQUEST_TARGET_CAPACITY: usize = 192;

pub type RequestTarget = String<REQUEST_TARGET_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("request target does not fit in {capacity} bytes")]
    Overflow { capacity: usize },
}

/// The values sent for one wake cycle.
///
/// Holds a [`Celsius`], so the disconnected sentinel can never be reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReport {
    pub temperature: Celsius,
    pub supply: Millivolts,
    pub duration_ms: Option<u64>,
}

impl TelemetryReport {
    /// Formats the path and query for the update request.
    pub fn request_target(&self, api_key: &str) -> Result<RequestTarget, FormatError> {
        let mut target = RequestTarget::new();
        self.write_target(&mut target, api_key)
            .map_err(|_| FormatError::Overflow {
                capacity: REQUEST_TARGET_CAPACITY,
            })?;
        Ok(target)
    }

    fn write_target(&self, out: &mut impl Write, api_key: &str) -> fmt::Result {
        write!(
            out,
            "{}?api_key={}&field1={:.2}&field2={}",
            UPDATE_PATH,
            QueryValue(api_key),
            self.temperature.get(),
            self.supply.get()
        )?;
        if let Some(duration_ms) = self.duration_ms {
            write!(out, "&field3={}", duration_ms)?;
        }
        Ok(())
    }
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
pub struct QueryValue<'a>(pub &'a str);

impl fmt::Display for QueryValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
                f.write_char(char::from(byte))?;
            } else {
                write!(f, "%{:02X}", byte)?;
            }
        }
        Ok(())
    }
}

/// Full URL of a request, for logging.
pub struct Url<'a> {
    pub host: &'a str,
    pub port: u16,
    pub target: &'a str,
}

impl fmt::Display for Url<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}", self.host)?;
        if self.port != 80 {
            write!(f, ":{}", self.port)?;
        }
        f.write_str(self.target)
    }
}
