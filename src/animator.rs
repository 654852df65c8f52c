//! Progress Animator
//!
//! Ticks the shared [`ProgressState`](crate::state::ProgressState) on a fixed
//! interval. Each run climbs from 0 to 100, holds at the ceiling for one extra
//! pause, descends back to 0 and stops. It stays stopped until the next start
//! command; it never loops on its own.

use crate::config::TimingConfig;
use crate::state::{AnimationStep, SharedState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Drives the progress counter.
pub struct ProgressAnimator {
    state: Arc<SharedState>,
    tick: Duration,
    ceiling_pause: Duration,
}

impl ProgressAnimator {
    /// Create an animator using the configured tick and ceiling pause.
    pub fn new(state: Arc<SharedState>, timing: &TimingConfig) -> Self {
        Self::with_intervals(state, timing.animation_tick(), timing.ceiling_pause())
    }

    /// Create an animator with explicit intervals.
    pub fn with_intervals(state: Arc<SharedState>, tick: Duration, ceiling_pause: Duration) -> Self {
        Self {
            state,
            tick,
            ceiling_pause,
        }
    }

    /// Run the loop on the Tokio runtime until `shutdown` turns true.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// The animation loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(tick_ms = self.tick.as_millis() as u64, "Progress animator started");

        while !*shutdown.borrow() {
            let (progress, step) = self.state.advance_progress();

            let delay = match step {
                AnimationStep::ReachedCeiling => {
                    debug!(value = progress.value(), "Progress reached ceiling, reversing");
                    self.ceiling_pause + self.tick
                }
                AnimationStep::Finished => {
                    info!("Progress animation finished");
                    self.tick
                }
                AnimationStep::Idle | AnimationStep::Moved => self.tick,
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Progress animator stopped");
    }
}
