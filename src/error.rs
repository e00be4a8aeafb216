//! Error types for the charging-spot monitor.
//!
//! Each subsystem owns a small typed enum rather than one catch-all type:
//! the frame decoder, the serial link, the sensor collaborators, the
//! notification gateway, and configuration loading.  Everything except
//! [`ConfigError`] is `Copy` so it can be logged and passed across the
//! channel threads without allocation.

use core::fmt;
use std::io;

// ---------------------------------------------------------------------------
// Frame decoder errors
// ---------------------------------------------------------------------------

/// A power-meter response that failed validation.
///
/// Variants are listed in the order the decoder checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer length does not match any known frame shape.
    Length { actual: usize },
    /// Address, function code or byte count does not match the variant.
    Header { address: u8, function: u8 },
    /// Trailing CRC-16 does not match the recomputed value.
    ChecksumMismatch { expected: u16, actual: u16 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length { actual } => write!(f, "unexpected frame length {actual}"),
            Self::Header { address, function } => {
                write!(f, "bad header {address:#04x} {function:#04x}")
            }
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: computed {expected:#06x}, frame carries {actual:#06x}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

// ---------------------------------------------------------------------------
// Serial link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The meter did not answer within the response timeout.
    Timeout,
    /// The configured device path does not exist.
    NoDevice,
    /// No handle is open (closed after an earlier failure).
    NotConnected,
    /// Read/write failed at the OS level.
    Io(io::ErrorKind),
    /// A response arrived but did not validate.
    Decode(DecodeError),
}

impl LinkError {
    /// Whether the caller should drop the handle and reconnect.
    ///
    /// A garbled frame is not a link failure: the sample is discarded and
    /// the next poll retries on the same handle.
    pub fn requires_reconnect(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "response timeout"),
            Self::NoDevice => write!(f, "serial device not found"),
            Self::NotConnected => write!(f, "link not connected"),
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<DecodeError> for LinkError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            io::ErrorKind::NotFound => Self::NoDevice,
            kind => Self::Io(kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor collaborator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Camera could not be opened or returned no frame.
    CameraUnavailable,
    /// The object-detection model failed on a frame.
    ClassifierFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CameraUnavailable => write!(f, "camera unavailable"),
            Self::ClassifierFailed => write!(f, "classifier failed"),
        }
    }
}

impl std::error::Error for SensorError {}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// The remote endpoint answered with a non-success status.
    Rejected(u16),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(status) => write!(f, "rejected with status {status}"),
        }
    }
}

impl std::error::Error for NotifyError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Configuration problems.  These are the only fatal errors and are
/// surfaced before any channel thread starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read.
    Io(io::ErrorKind),
    /// Config file is not valid JSON for [`SpotConfig`](crate::config::SpotConfig).
    Parse(String),
    /// A field failed range validation; names the field.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "cannot read config: {kind}"),
            Self::Parse(msg) => write!(f, "cannot parse config: {msg}"),
            Self::Invalid(field) => write!(f, "invalid config value: {field}"),
        }
    }
}

impl std::error::Error for ConfigError {}
