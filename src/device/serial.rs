//! Serial hardware backend
//!
//! Opens real ports through the `serialport` crate. Without the `serial` feature the
//! opener still exists but every open fails with
//! [`BridgeError::SerialFeatureDisabled`], so the bridge runs device-less.

use super::{DevicePort, PortOpener};
use crate::config::DeviceConfig;
use crate::error::{AppResult, BridgeError};

#[cfg(feature = "serial")]
use std::io::{self, Read, Write};

/// Opens the configured serial port with its read timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

#[cfg(feature = "serial")]
impl PortOpener for SerialPortOpener {
    fn open(&self, config: &DeviceConfig) -> AppResult<Box<dyn DevicePort>> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout())
            .open()
            .map_err(|err| BridgeError::DeviceOpen {
                address: config.port.clone(),
                baud_rate: config.baud_rate,
                source: err.into(),
            })?;

        Ok(Box::new(SerialDevicePort { port }))
    }
}

#[cfg(not(feature = "serial"))]
impl PortOpener for SerialPortOpener {
    fn open(&self, _config: &DeviceConfig) -> AppResult<Box<dyn DevicePort>> {
        Err(BridgeError::SerialFeatureDisabled)
    }
}

#[cfg(feature = "serial")]
struct SerialDevicePort {
    port: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "serial")]
impl Read for SerialDevicePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

#[cfg(feature = "serial")]
impl Write for SerialDevicePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

#[cfg(feature = "serial")]
impl DevicePort for SerialDevicePort {
    fn bytes_to_read(&self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }
}
