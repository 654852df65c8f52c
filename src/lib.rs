//! # Serial Bridge
//!
//! Bridges a line-oriented serial device to a small HTTP API. The device streams
//! telemetry as newline-terminated JSON (or free text); HTTP clients read the
//! latest record, send commands back down the wire, and drive a demo progress
//! animation that runs independently of the device.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered configuration (defaults, TOML file, environment) via `figment`.
//! - **`error`**: The `BridgeError` enum and the `AppResult` alias.
//! - **`tracing_setup`**: Global `tracing` subscriber setup.
//! - **`telemetry`**: `TelemetryRecord`, one parsed line from the device.
//! - **`device`**: `DeviceLink`, the exclusive serial connection, plus the real and
//!   mock port openers.
//! - **`state`**: `SharedState`, the store shared by the poller, the animator and
//!   the API.
//! - **`poller`**: Background loop moving telemetry from the device into the store.
//! - **`animator`**: Background loop driving the progress value.
//! - **`api`**: The HTTP routes and server.
//! - **`bridge`**: Wires everything together and handles shutdown.

pub mod animator;
pub mod api;
pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod poller;
pub mod state;
pub mod telemetry;
pub mod tracing_setup;

pub use bridge::{Bridge, BridgeHandle};
pub use config::BridgeConfig;
pub use error::{AppResult, BridgeError};
