//! Shared State Store
//!
//! [`SharedState`] is the one place holding the canonical copies of:
//! - the latest [`TelemetryRecord`] (a last-value cache on `tokio::sync::watch`)
//! - the animated [`ProgressState`] (behind a mutex, so a tick is one atomic step)
//! - the device [`ConnectionStatus`] (a watch on the Device Link's open flag)
//!
//! Everything else works on snapshots. Each field is consistent on its own, but
//! two separate reads may observe different ticks; use [`SharedState::snapshot`]
//! when several fields are needed together.

use crate::telemetry::TelemetryRecord;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Lower bound of the progress value.
pub const PROGRESS_MIN: u8 = 0;

/// Upper bound of the progress value.
pub const PROGRESS_MAX: u8 = 100;

/// Which way the progress value is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Counting up (+1 per tick)
    Increasing,
    /// Counting down (-1 per tick)
    Decreasing,
}

impl Direction {
    /// Signed step applied per tick: `+1` or `-1`.
    pub fn step(self) -> i8 {
        match self {
            Direction::Increasing => 1,
            Direction::Decreasing => -1,
        }
    }

    /// Human-readable label used by the status page.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Increasing => "Increasing",
            Direction::Decreasing => "Decreasing",
        }
    }
}

/// What one animation tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationStep {
    /// Not running; nothing changed
    Idle,
    /// Value moved by one step
    Moved,
    /// Value hit the ceiling and the direction flipped to decreasing
    ReachedCeiling,
    /// Value returned to the floor while decreasing; the animation stopped
    Finished,
}

/// The bounded, direction-aware animated counter.
///
/// Fields are private so the value can never leave `PROGRESS_MIN..=PROGRESS_MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    value: u8,
    direction: Direction,
    running: bool,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            value: PROGRESS_MIN,
            direction: Direction::Increasing,
            running: false,
        }
    }
}

impl ProgressState {
    /// State right after a start command: `{0, +1, running}`.
    pub fn started() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    /// Current value in `0..=100`.
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Current direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the animator is advancing the value.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Halt without touching value or direction.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Apply one animation tick.
    ///
    /// Moves the value one step, flips to decreasing at the ceiling and stops for
    /// good once it is back at the floor. It never turns around at the floor; only a
    /// new start does that.
    pub fn advance(&mut self) -> AnimationStep {
        if !self.running {
            return AnimationStep::Idle;
        }

        let next = i16::from(self.value) + i16::from(self.direction.step());
        self.value = next.clamp(i16::from(PROGRESS_MIN), i16::from(PROGRESS_MAX)) as u8;

        if self.value >= PROGRESS_MAX {
            self.direction = Direction::Decreasing;
            AnimationStep::ReachedCeiling
        } else if self.value <= PROGRESS_MIN && self.direction == Direction::Decreasing {
            self.running = false;
            AnimationStep::Finished
        } else {
            AnimationStep::Moved
        }
    }
}

/// Whether the Device Link currently has an open port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Port open
    Connected,
    /// No port (never opened, failed, or closed)
    Disconnected,
}

impl ConnectionStatus {
    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
        }
    }

    /// Lower-case form, used for CSS classes and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }

    /// Whether the device is connected.
    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

impl From<bool> for ConnectionStatus {
    fn from(open: bool) -> Self {
        if open {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

/// Every field of the store, copied under one call.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Device connection status
    pub connection: ConnectionStatus,
    /// Latest telemetry
    pub telemetry: TelemetryRecord,
    /// Progress animation state
    pub progress: ProgressState,
}

/// The synchronization point shared by the poller, the animator and the API.
#[derive(Debug)]
pub struct SharedState {
    telemetry: watch::Sender<TelemetryRecord>,
    progress: Mutex<ProgressState>,
    connection: watch::Receiver<bool>,
}

impl SharedState {
    /// Create a store whose connection status follows `connection`
    /// (see [`DeviceLink::subscribe_status`](crate::device::DeviceLink::subscribe_status)).
    pub fn new(connection: watch::Receiver<bool>) -> Self {
        let (telemetry, _) = watch::channel(TelemetryRecord::default());
        Self {
            telemetry,
            progress: Mutex::new(ProgressState::default()),
            connection,
        }
    }

    /// A store with no device behind it; always reports disconnected.
    pub fn detached() -> Self {
        let (_, connection) = watch::channel(false);
        Self::new(connection)
    }

    /// Copy of the latest telemetry record.
    pub fn telemetry(&self) -> TelemetryRecord {
        self.telemetry.borrow().clone()
    }

    /// Replace the telemetry record as a whole.
    pub fn publish_telemetry(&self, record: TelemetryRecord) {
        self.telemetry.send_replace(record);
    }

    /// Follow telemetry updates. Only the newest value is ever retained.
    pub fn subscribe_telemetry(&self) -> watch::Receiver<TelemetryRecord> {
        self.telemetry.subscribe()
    }

    /// Copy of the progress state.
    pub fn progress(&self) -> ProgressState {
        *self.progress_lock()
    }

    /// Reset to `{0, +1, running}` regardless of the current state.
    pub fn start_animation(&self) -> ProgressState {
        let mut progress = self.progress_lock();
        *progress = ProgressState::started();
        *progress
    }

    /// Clear `running`; value and direction stay where they are.
    pub fn stop_animation(&self) -> ProgressState {
        let mut progress = self.progress_lock();
        progress.stop();
        *progress
    }

    /// Apply one animation tick atomically and return the resulting state.
    pub fn advance_progress(&self) -> (ProgressState, AnimationStep) {
        let mut progress = self.progress_lock();
        let step = progress.advance();
        (*progress, step)
    }

    /// Current device connection status.
    pub fn connection(&self) -> ConnectionStatus {
        ConnectionStatus::from(*self.connection.borrow())
    }

    /// All fields at once.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            connection: self.connection(),
            telemetry: self.telemetry(),
            progress: self.progress(),
        }
    }

    fn progress_lock(&self) -> MutexGuard<'_, ProgressState> {
        // ProgressState is Copy and every mutation is a single step
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
