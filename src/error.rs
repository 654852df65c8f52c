//! Custom error types for the bridge.
//!
//! This module defines the primary error type, `BridgeError`, for the whole crate.
//! Using the `thiserror` crate, it gives one consistent place for every failure the
//! bridge can run into, from configuration problems to serial I/O.
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: configuration that failed to load or failed
//!   validation. These are the only errors that stop the process at startup, together
//!   with **`Server`** (e.g. the HTTP port is already in use).
//! - **`DeviceOpen`**: the serial device could not be opened. Logged, and the bridge
//!   keeps running without a device.
//! - **`DeviceRead`**: a line could not be read. Never fatal; the poller skips it.
//! - **`DeviceWrite`** / **`DeviceNotConnected`**: a command could not be sent. Reported
//!   to the HTTP caller as `{"status": "failed"}`, never retried.
//!
//! Malformed client input is not an error at this level: the API answers it with a
//! soft-failure JSON body and a 200 status.

use thiserror::Error;

/// Convenience alias for results using the bridge error type.
pub type AppResult<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open serial port '{address}' at {baud_rate} baud: {source}")]
    DeviceOpen {
        address: String,
        baud_rate: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Serial port not connected")]
    DeviceNotConnected,

    #[error("Serial write failed: {0}")]
    DeviceWrite(#[source] std::io::Error),

    #[error("Serial read failed: {0}")]
    DeviceRead(#[source] std::io::Error),

    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    #[error("HTTP server error: {0}")]
    Server(#[from] hyper::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

impl BridgeError {
    /// Whether the bridge can keep serving after this error.
    ///
    /// Device-level failures are absorbed; configuration, startup and
    /// runtime-infrastructure failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::DeviceOpen { .. }
                | BridgeError::DeviceNotConnected
                | BridgeError::DeviceWrite(_)
                | BridgeError::DeviceRead(_)
                | BridgeError::SerialFeatureDisabled
        )
    }
}
