//! Transport abstraction for the meter's byte channel.
//!
//! Concrete implementations:
//! - USB-RS485 / TTL serial adapter (`adapters::serial`, `hardware` feature)
//! - scripted in-memory link (integration tests)
//!
//! The link supervisor is generic over [`Connector`], so a new way of
//! reaching the meter needs no change to the request/response logic.

use crate::error::LinkError;

/// Byte-oriented, half-duplex channel to the meter.
pub trait Transport {
    /// Error type for this transport.
    type Error: Into<LinkError> + core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 when the response timeout elapses with nothing received.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data`.  Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Discard bytes left over from an earlier, abandoned exchange.
    fn clear_input(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Opens fresh [`Transport`] handles to the same device.
pub trait Connector {
    type Link: Transport;

    fn open(&mut self) -> Result<Self::Link, LinkError>;

    /// Human-readable device name for log lines.
    fn describe(&self) -> &str;
}
