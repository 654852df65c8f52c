//! Telemetry Poller
//!
//! Background loop that asks the [`DeviceLink`] for new lines every poll interval
//! and publishes the newest record into the [`SharedState`]. The telemetry slot is
//! a single overwritten value, so anything superseded within one interval is
//! dropped. Read problems are logged and skipped; the loop only ends on shutdown.

use crate::device::DeviceLink;
use crate::state::SharedState;
use crate::telemetry::TelemetryRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Moves telemetry from the device into the shared store.
pub struct TelemetryPoller {
    link: Arc<DeviceLink>,
    state: Arc<SharedState>,
    interval: Duration,
}

impl TelemetryPoller {
    /// Create a poller ticking every `interval`.
    pub fn new(link: Arc<DeviceLink>, state: Arc<SharedState>, interval: Duration) -> Self {
        Self {
            link,
            state,
            interval,
        }
    }

    /// Run the loop on the Tokio runtime until `shutdown` turns true.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// The polling loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(interval_ms = self.interval.as_millis() as u64, "Telemetry poller started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => {
                    self.poll_once().await;
                }
            }
        }

        debug!("Telemetry poller stopped");
    }

    /// One tick: read what the device has sent and publish the newest record.
    ///
    /// Returns the published record, if any.
    pub async fn poll_once(&self) -> Option<TelemetryRecord> {
        if !self.link.is_open() {
            return None;
        }

        let link = Arc::clone(&self.link);
        let record = match tokio::task::spawn_blocking(move || link.read_latest()).await {
            Ok(record) => record?,
            Err(err) => {
                warn!(error = %err, "Serial read task panicked");
                return None;
            }
        };

        trace!(raw = record.is_raw(), "Publishing telemetry record");
        self.state.publish_telemetry(record.clone());
        Some(record)
    }
}
