//! CLI entry point for serial-bridge
//!
//! Loads the layered configuration, applies command-line overrides, installs the
//! tracing subscriber and runs the bridge until Ctrl+C.
//!
//! # Usage
//! ```bash
//! serial-bridge --device /dev/ttyACM0 --baud 115200
//! serial-bridge --mock-device --port 8080 --log-level debug
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use serial_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use serial_bridge::device::mock::MockDevice;
use serial_bridge::device::SerialPortOpener;
use serial_bridge::{tracing_setup, Bridge};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "serial-bridge")]
#[command(about = "Bridge a serial telemetry device to an HTTP API", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial port path, overrides device.port
    #[arg(long)]
    device: Option<String>,

    /// Baud rate, overrides device.baud_rate
    #[arg(long)]
    baud: Option<u32>,

    /// HTTP port, overrides server.port
    #[arg(long)]
    port: Option<u16>,

    /// HTTP bind address, overrides server.host
    #[arg(long)]
    host: Option<String>,

    /// Log level, overrides application.log_level
    #[arg(long)]
    log_level: Option<String>,

    /// Use an in-memory device instead of a serial port
    #[arg(long)]
    mock_device: bool,
}

impl Cli {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(device) = &self.device {
            config.device.port = device.clone();
        }
        if let Some(baud) = self.baud {
            config.device.baud_rate = baud;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(level) = &self.log_level {
            config.application.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BridgeConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    cli.apply(&mut config);
    config.validate().context("Invalid command-line override")?;

    tracing_setup::init_from_config(&config).context("Failed to initialize tracing")?;
    info!(
        name = %config.application.name,
        device = %config.device.port,
        baud_rate = config.device.baud_rate,
        mock = cli.mock_device,
        "Starting"
    );

    let bridge = if cli.mock_device {
        Bridge::new(config, MockDevice::new())
    } else {
        Bridge::new(config, SerialPortOpener)
    };
    let handle = bridge.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C");

    handle.shutdown().await?;
    Ok(())
}
