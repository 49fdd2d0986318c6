//! Heartbeat Manager
//!
//! Asks the feed client to ping on a fixed interval, then declares the
//! connection dead if no traffic arrives within the pong timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// How long to wait for any traffic after a ping.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(60),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a protocol ping.
    SendPing,
    /// Nothing arrived within the pong timeout.
    Timeout,
}

/// State shared between the manager and the receive loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_seen: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_seen: RwLock::new(Instant::now()),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Record inbound traffic (a pong or any data frame).
    pub fn record_traffic(&self) {
        *self.last_seen.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Mark that a ping is outstanding.
    pub fn mark_ping_sent(&self) {
        self.waiting_for_pong.store(true, Ordering::SeqCst);
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Time since the last inbound traffic.
    #[must_use]
    pub fn time_since_traffic(&self) -> Duration {
        self.last_seen.read().elapsed()
    }
}

/// Drives pings for one connection. Spawn [`HeartbeatManager::run`] per
/// connection and cancel it when the connection ends.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the receiver is dropped, or a timeout fires.
    pub async fn run(self) {
        loop {
            if !self.wait(self.config.ping_interval).await {
                return;
            }

            self.state.mark_ping_sent();
            if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
                tracing::debug!("Event channel closed, stopping heartbeat");
                return;
            }

            if !self.wait(self.config.pong_timeout).await {
                return;
            }

            if self.state.is_waiting_for_pong() {
                tracing::warn!(
                    silent_secs = self.state.time_since_traffic().as_secs(),
                    timeout_secs = self.config.pong_timeout.as_secs(),
                    "Heartbeat timeout detected"
                );
                let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                return;
            }
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => {
                tracing::debug!("Heartbeat manager cancelled");
                false
            }
            () = tokio::time::sleep(duration) => true,
        }
    }
}
