//! Reconnect state machine for one bridge side.

use std::time::Duration;

use tokio::time;
use tracing::info;

/// Connection lifecycle state of one bridge side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// No transport; a retry is pending.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The transport is live.
    Connected,
}

/// Tracks one side's connection state and owns its single retry timer.
///
/// The timer is the `wait` suspension point; it takes `&mut self`, so
/// a side can never have two timers armed at once.
#[derive(Debug)]
pub struct Reconnector {
    label: &'static str,
    interval: Duration,
    state: ReconnectState,
}

impl Reconnector {
    /// Create a machine in the `Disconnected` state.
    pub fn new(label: &'static str, interval: Duration) -> Self {
        Self {
            label,
            interval,
            state: ReconnectState::Disconnected,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReconnectState {
        self.state
    }

    /// Retry interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A connect attempt is starting.
    pub fn connecting(&mut self) {
        self.state = ReconnectState::Connecting;
    }

    /// The connect attempt succeeded; the retry timer is disarmed by
    /// virtue of control being here.
    pub fn connected(&mut self) {
        info!("{}: connected", self.label);
        self.state = ReconnectState::Connected;
    }

    /// The transport is gone (failed connect or mid-session death).
    pub fn disconnected(&mut self) {
        if self.state != ReconnectState::Disconnected {
            info!(
                "{}: disconnected, reconnecting every {:?}",
                self.label, self.interval
            );
            self.state = ReconnectState::Disconnected;
        }
    }

    /// Arm the side's single retry timer and wait for it to fire.
    pub async fn wait(&mut self) {
        time::sleep(self.interval).await;
    }
}
