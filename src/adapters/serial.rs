//! Serial-port meter connector (9600 8N1) on the `serialport` crate.

use core::time::Duration;
use std::io::{self, Read, Write};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::LinkError;
use crate::meter::transport::{Connector, Transport};

pub const BAUD_RATE: u32 = 9600;

pub struct SerialConnector {
    path: String,
    timeout: Duration,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }
}

impl Connector for SerialConnector {
    type Link = SerialLink;

    fn open(&mut self) -> Result<SerialLink, LinkError> {
        let port = serialport::new(&self.path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => LinkError::NoDevice,
                serialport::ErrorKind::Io(kind) => LinkError::from(io::Error::from(kind)),
                _ => LinkError::Io(io::ErrorKind::Other),
            })?;
        Ok(SerialLink { port })
    }

    fn describe(&self) -> &str {
        &self.path
    }
}

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl Transport for SerialLink {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        match self.port.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, io::Error> {
        self.port.write(data)
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        self.port.flush()
    }

    fn clear_input(&mut self) -> Result<(), io::Error> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}
