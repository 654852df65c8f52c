//! Bridge configuration using Figment
//!
//! Configuration is layered, later sources winning:
//! 1. Built-in defaults (the values the bridge has always shipped with)
//! 2. An optional TOML file (`config/serial-bridge.toml` by default)
//! 3. Environment variables prefixed with `SERIAL_BRIDGE_`, using `__` between
//!    nested keys
//!
//! # Example
//! ```no_run
//! use serial_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::load()?;
//! println!("Serial port: {}", config.device.port);
//! # Ok::<(), serial_bridge::error::BridgeError>(())
//! ```
//!
//! ```text
//! SERIAL_BRIDGE_DEVICE__PORT=/dev/ttyACM0 SERIAL_BRIDGE_SERVER__PORT=8080 serial-bridge
//! ```

use crate::error::{AppResult, BridgeError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/serial-bridge.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "SERIAL_BRIDGE_";

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial device settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Background loop timing
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Serial device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    #[serde(default = "default_port")]
    pub port: String,
    /// Communication speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port (0 picks a free port)
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Intervals of the two background loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Telemetry poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Progress animation tick in milliseconds
    #[serde(default = "default_animation_tick")]
    pub animation_tick_ms: u64,
    /// Extra pause when the animation reaches its ceiling, in milliseconds
    #[serde(default = "default_ceiling_pause")]
    pub ceiling_pause_ms: u64,
}

// Default value functions
fn default_name() -> String {
    "Serial Bridge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_animation_tick() -> u64 {
    50
}

fn default_ceiling_pause() -> u64 {
    1000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            animation_tick_ms: default_animation_tick(),
            ceiling_pause_ms: default_ceiling_pause(),
        }
    }
}

impl DeviceConfig {
    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl TimingConfig {
    /// Telemetry poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Animation tick interval
    pub fn animation_tick(&self) -> Duration {
        Duration::from_millis(self.animation_tick_ms)
    }

    /// Pause at the animation ceiling
    pub fn ceiling_pause(&self) -> Duration {
        Duration::from_millis(self.ceiling_pause_ms)
    }
}

impl BridgeConfig {
    /// Load configuration from the default file (if present) and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path plus the environment.
    ///
    /// A missing file is not an error; the defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider stack used by [`BridgeConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(BridgeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(BridgeError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(BridgeError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.device.port.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "device.port must not be empty".to_string(),
            ));
        }

        if self.device.baud_rate == 0 {
            return Err(BridgeError::Configuration(
                "device.baud_rate must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("device.read_timeout_ms", self.device.read_timeout_ms),
            ("timing.poll_interval_ms", self.timing.poll_interval_ms),
            ("timing.animation_tick_ms", self.timing.animation_tick_ms),
        ] {
            if value == 0 {
                return Err(BridgeError::Configuration(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        self.server.socket_addr()?;
        Ok(())
    }
}

impl ServerConfig {
    /// Parse host and port into a bindable address.
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            BridgeError::Configuration(format!("Invalid server host '{}'", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
