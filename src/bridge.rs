//! Bridge wiring
//!
//! Builds the device link and the shared state, then starts the three concurrent
//! activities that make up the bridge: the telemetry poller, the progress
//! animator and the HTTP server. All of them watch one shutdown flag.
//!
//! A missing device never stops startup. The link stays closed, `/data` keeps
//! serving the empty record and `/reconnect` can retry later.

use crate::animator::ProgressAnimator;
use crate::api::{self, ApiContext};
use crate::config::BridgeConfig;
use crate::device::{DeviceLink, PortOpener};
use crate::error::{AppResult, BridgeError};
use crate::poller::TelemetryPoller;
use crate::state::SharedState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A configured, not yet running bridge.
pub struct Bridge {
    config: BridgeConfig,
    link: Arc<DeviceLink>,
}

impl Bridge {
    /// Prepare a bridge that opens its device through `opener`.
    pub fn new(config: BridgeConfig, opener: impl PortOpener + 'static) -> Self {
        let link = Arc::new(DeviceLink::new(config.device.clone(), opener));
        Self { config, link }
    }

    /// Open the device, bind the server and spawn the background loops.
    pub async fn start(self) -> AppResult<BridgeHandle> {
        let link = Arc::clone(&self.link);
        match tokio::task::spawn_blocking(move || link.connect()).await? {
            Ok(()) => {}
            Err(err) => warn!(
                error = %err,
                "Starting without a serial device; use /reconnect to retry"
            ),
        }

        let state = Arc::new(SharedState::new(self.link.subscribe_status()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let addr = self.config.server.socket_addr()?;
        let ctx = Arc::new(ApiContext::new(Arc::clone(&state), Arc::clone(&self.link)));
        let (local_addr, server) = api::spawn_server(addr, ctx, shutdown_rx.clone())?;

        let poller = TelemetryPoller::new(
            Arc::clone(&self.link),
            Arc::clone(&state),
            self.config.timing.poll_interval(),
        )
        .spawn(shutdown_rx.clone());
        let animator =
            ProgressAnimator::new(Arc::clone(&state), &self.config.timing).spawn(shutdown_rx);

        info!(
            address = %local_addr,
            device = %self.link.address(),
            connected = self.link.is_open(),
            "Serial bridge running"
        );

        Ok(BridgeHandle {
            local_addr,
            state,
            link: self.link,
            shutdown_tx,
            tasks: vec![poller, animator],
            server,
        })
    }
}

/// Handle to a running bridge.
pub struct BridgeHandle {
    local_addr: SocketAddr,
    state: Arc<SharedState>,
    link: Arc<DeviceLink>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    server: JoinHandle<AppResult<()>>,
}

impl BridgeHandle {
    /// Address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared state store.
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// The device link.
    pub fn link(&self) -> &Arc<DeviceLink> {
        &self.link
    }

    /// Stop every loop, wait for them and close the device.
    ///
    /// The device is closed even when a task failed; the first failure is returned.
    pub async fn shutdown(self) -> AppResult<()> {
        info!("Shutting down serial bridge");
        self.shutdown_tx.send_replace(true);

        let mut outcome: AppResult<()> = Ok(());
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Background task failed");
                outcome = outcome.and(Err(BridgeError::from(err)));
            }
        }
        let served = match self.server.await {
            Ok(served) => served,
            Err(err) => Err(BridgeError::from(err)),
        };
        outcome = outcome.and(served);

        self.link.close();
        info!("Serial bridge stopped");
        outcome
    }
}
