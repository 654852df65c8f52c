//! Device Link: the single owner of the serial connection.
//!
//! [`DeviceLink`] wraps whatever [`PortOpener`] produced the port (real serial
//! hardware in production, [`mock::MockDevice`] in tests) behind one mutex, so the
//! telemetry poller's reads and the API's command writes never interleave on the
//! handle.
//!
//! All methods block on I/O. Async callers run them through
//! `tokio::task::spawn_blocking`, the same way the serial adapters always have.
//!
//! # Example
//! ```
//! use serial_bridge::config::DeviceConfig;
//! use serial_bridge::device::{mock::MockDevice, DeviceLink};
//!
//! let device = MockDevice::new();
//! let link = DeviceLink::new(DeviceConfig::default(), device.clone());
//! link.connect().unwrap();
//!
//! device.push_line(r#"{"temp": 21.5}"#);
//! let record = link.read_record().unwrap();
//! assert_eq!(record.to_json()["temp"], 21.5);
//!
//! link.send_line("PING").unwrap();
//! assert_eq!(device.written_lines(), vec!["PING"]);
//! ```

pub mod mock;
pub mod serial;

use crate::config::DeviceConfig;
use crate::error::{AppResult, BridgeError};
use crate::telemetry::TelemetryRecord;
use std::io::{self, Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use serial::SerialPortOpener;

/// Largest chunk pulled from the port in one read.
const READ_CHUNK: usize = 1024;

/// Unterminated input beyond this many bytes is discarded.
const MAX_PENDING: usize = 64 * 1024;

/// An open, line-oriented byte stream to the device.
pub trait DevicePort: Read + Write + Send {
    /// Number of bytes waiting in the receive buffer.
    fn bytes_to_read(&self) -> io::Result<usize>;
}

/// Opens [`DevicePort`]s. The seam between the link and real hardware.
pub trait PortOpener: Send + Sync {
    /// Open the port described by `config`.
    fn open(&self, config: &DeviceConfig) -> AppResult<Box<dyn DevicePort>>;
}

struct LinkInner {
    port: Option<Box<dyn DevicePort>>,
    /// Bytes read from the port that do not yet form a complete line
    pending: Vec<u8>,
}

/// The serial connection shared by the poller and the API server.
pub struct DeviceLink {
    config: DeviceConfig,
    opener: Box<dyn PortOpener>,
    inner: Mutex<LinkInner>,
    open_tx: watch::Sender<bool>,
}

impl DeviceLink {
    /// Create a closed link. Nothing is opened until [`DeviceLink::connect`].
    pub fn new(config: DeviceConfig, opener: impl PortOpener + 'static) -> Self {
        let (open_tx, _) = watch::channel(false);
        Self {
            config,
            opener: Box::new(opener),
            inner: Mutex::new(LinkInner {
                port: None,
                pending: Vec::new(),
            }),
            open_tx,
        }
    }

    /// Serial port path this link talks to.
    pub fn address(&self) -> &str {
        &self.config.port
    }

    /// Configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }

    /// Whether the port is currently open.
    pub fn is_open(&self) -> bool {
        *self.open_tx.borrow()
    }

    /// Watch the open/closed flag. The receiver always holds the latest value.
    pub fn subscribe_status(&self) -> watch::Receiver<bool> {
        self.open_tx.subscribe()
    }

    /// Open the configured port.
    ///
    /// Failure is logged and returned; the link simply stays closed so the rest of
    /// the bridge keeps running. An already open port is replaced by a fresh one.
    pub fn connect(&self) -> AppResult<()> {
        let mut inner = self.lock();
        inner.port = None;
        inner.pending.clear();

        match self.opener.open(&self.config) {
            Ok(port) => {
                inner.port = Some(port);
                self.open_tx.send_replace(true);
                info!(
                    port = %self.config.port,
                    baud_rate = self.config.baud_rate,
                    "Connected to serial device"
                );
                Ok(())
            }
            Err(err) => {
                self.open_tx.send_replace(false);
                warn!(port = %self.config.port, error = %err, "Failed to connect to serial device");
                Err(err)
            }
        }
    }

    /// Read one record if a complete line is available.
    ///
    /// Only touches the port when it reports pending input, so this never waits on
    /// a quiet device. Lines that are not UTF-8 are skipped; lines that are not
    /// JSON, blank ones included, come back as raw records. Returns `None` when the
    /// link is closed or no full line has arrived yet.
    pub fn read_record(&self) -> Option<TelemetryRecord> {
        let mut inner = self.lock();
        let LinkInner { port, pending } = &mut *inner;
        let port = port.as_mut()?;

        loop {
            while let Some(line) = take_line(pending) {
                match String::from_utf8(line) {
                    Ok(text) => return Some(TelemetryRecord::from_line(&text)),
                    Err(err) => {
                        debug!(error = %err, "Skipping serial line that is not UTF-8");
                    }
                }
            }

            match fill_pending(&mut **port, pending) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %BridgeError::DeviceRead(err), "Error reading serial data");
                    return None;
                }
            }

            if pending.len() > MAX_PENDING && !pending.contains(&b'\n') {
                warn!(
                    bytes = pending.len(),
                    "Discarding unterminated serial input"
                );
                pending.clear();
            }
        }
    }

    /// Read every complete line currently available and keep only the newest record.
    pub fn read_latest(&self) -> Option<TelemetryRecord> {
        let mut latest = None;
        while let Some(record) = self.read_record() {
            latest = Some(record);
        }
        latest
    }

    /// Send `command` followed by a newline.
    ///
    /// Fails with [`BridgeError::DeviceNotConnected`] when the link is closed and
    /// [`BridgeError::DeviceWrite`] when the write fails. Nothing is retried.
    pub fn send_line(&self, command: &str) -> AppResult<()> {
        let mut inner = self.lock();
        let port = inner.port.as_mut().ok_or(BridgeError::DeviceNotConnected)?;

        let line = format!("{command}\n");
        port.write_all(line.as_bytes())
            .and_then(|()| port.flush())
            .map_err(BridgeError::DeviceWrite)?;

        debug!(command = %command, "Sent serial command");
        Ok(())
    }

    /// Release the port. Safe to call repeatedly.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.pending.clear();
        if inner.port.take().is_some() {
            info!(port = %self.config.port, "Closed serial device");
        }
        self.open_tx.send_replace(false);
    }

    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        // Every critical section leaves the port and buffer usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("port", &self.config.port)
            .field("baud_rate", &self.config.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Split the first `\n`-terminated line off `pending`, without the terminator.
fn take_line(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = pending.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = pending.drain(..=end).collect();
    line.pop();
    Some(line)
}

/// Move whatever the port has buffered into `pending`. Returns the byte count.
fn fill_pending(port: &mut dyn DevicePort, pending: &mut Vec<u8>) -> io::Result<usize> {
    let available = port.bytes_to_read()?;
    if available == 0 {
        return Ok(0);
    }

    let mut buffer = vec![0u8; available.min(READ_CHUNK)];
    match port.read(&mut buffer) {
        Ok(n) => {
            pending.extend_from_slice(&buffer[..n]);
            Ok(n)
        }
        Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
        Err(err) => Err(err),
    }
}
