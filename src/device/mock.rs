//! In-memory device for testing
//!
//! `MockDevice` stands in for serial hardware. It provides:
//! - Scripted inbound lines (what the device "sends")
//! - A record of everything written to it
//! - Failure injection for opening and writing
//!
//! Clones share the same wire, so a test keeps one handle while the
//! [`DeviceLink`](super::DeviceLink) owns another.

use super::{DevicePort, PortOpener};
use crate::config::DeviceConfig;
use crate::error::{AppResult, BridgeError};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MockWire {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    fail_open: bool,
    fail_writes: bool,
    open_count: usize,
}

/// Mock serial device
///
/// # Example
///
/// ```
/// use serial_bridge::config::DeviceConfig;
/// use serial_bridge::device::{mock::MockDevice, DeviceLink};
///
/// let device = MockDevice::new();
/// device.set_fail_open(true);
///
/// let link = DeviceLink::new(DeviceConfig::default(), device.clone());
/// assert!(link.connect().is_err());
/// assert!(!link.is_open());
/// ```
#[derive(Clone, Default)]
pub struct MockDevice {
    wire: Arc<Mutex<MockWire>>,
}

impl MockDevice {
    /// Create a device with nothing queued
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `line` plus a newline for the link to read
    pub fn push_line(&self, line: &str) {
        let mut wire = self.wire();
        wire.inbound.extend(line.as_bytes());
        wire.inbound.push_back(b'\n');
    }

    /// Queue raw bytes, e.g. a line split across reads
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.wire().inbound.extend(bytes);
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.wire().written.clone()
    }

    /// Written bytes split into newline-terminated lines, terminators removed
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.wire().written)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Make the next and all later opens fail until cleared
    pub fn set_fail_open(&self, fail: bool) {
        self.wire().fail_open = fail;
    }

    /// Make writes fail until cleared
    pub fn set_fail_writes(&self, fail: bool) {
        self.wire().fail_writes = fail;
    }

    /// How many times the device was successfully opened
    pub fn open_count(&self) -> usize {
        self.wire().open_count
    }

    fn wire(&self) -> MutexGuard<'_, MockWire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PortOpener for MockDevice {
    fn open(&self, config: &DeviceConfig) -> AppResult<Box<dyn DevicePort>> {
        let mut wire = self.wire();
        if wire.fail_open {
            return Err(BridgeError::DeviceOpen {
                address: config.port.clone(),
                baud_rate: config.baud_rate,
                source: io::Error::new(io::ErrorKind::NotFound, "mock device unavailable"),
            });
        }
        wire.open_count += 1;
        Ok(Box::new(MockPort {
            wire: Arc::clone(&self.wire),
        }))
    }
}

struct MockPort {
    wire: Arc<Mutex<MockWire>>,
}

impl MockPort {
    fn wire(&self) -> MutexGuard<'_, MockWire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire();
        let n = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut wire = self.wire();
        if wire.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        wire.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DevicePort for MockPort {
    fn bytes_to_read(&self) -> io::Result<usize> {
        Ok(self.wire().inbound.len())
    }
}
