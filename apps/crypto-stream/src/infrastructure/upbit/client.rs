//! Feed Client
//!
//! Streams order-book snapshots from the exchange into one queue.
//!
//! ```text
//! Disconnected ──► Connecting ──► Subscribed ──► Streaming
//!       ▲               │                            │
//!       └── wait 5 s ───┘                            │
//!       └────────────── reconnect immediately ───────┘
//! ```
//!
//! Every connection re-sends the full subscription. A queue failure never
//! tears down the WebSocket: the queue is re-acquired and the frame that hit
//! the failure is dropped.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::{self, FeedFrame};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::messages::SubscriptionRequest;
use crate::application::ports::{Connector, DurableQueue};
use crate::application::services::retry::{RetryConfig, RetryPolicy};
use crate::application::services::supervisor::ConnectionSupervisor;
use crate::infrastructure::config::ProducerConfig;
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default limit on one connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one feed connection.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The subscription could not be serialized.
    #[error("failed to serialize subscription: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Server closed the stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// No traffic after a ping.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// The WebSocket handshake did not finish in time.
    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),
}

// =============================================================================
// Configuration and State
// =============================================================================

/// Configuration for one feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Destination queue.
    pub queue: String,
    /// Qualified subscription codes.
    pub codes: Vec<String>,
    /// Delay schedule after a failed connection attempt.
    pub reconnect: RetryConfig,
    /// Limit on the TCP, TLS and WebSocket handshake plus subscription.
    pub connect_timeout: Duration,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl FeedClientConfig {
    /// Client settings for a producer instance.
    #[must_use]
    pub fn from_producer(producer: &ProducerConfig, reconnect: RetryConfig) -> Self {
        Self {
            url: producer.url.clone(),
            queue: producer.queue.clone(),
            codes: producer.codes(),
            reconnect,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat: HeartbeatConfig {
                ping_interval: producer.ping_interval(),
                ..HeartbeatConfig::default()
            },
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No connection.
    Disconnected,
    /// Opening the WebSocket.
    Connecting,
    /// Subscription sent.
    Subscribed,
    /// Receiving frames.
    Streaming,
}

impl FeedState {
    /// Log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
        }
    }
}

/// Totals for one client run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Frames received.
    pub frames: u64,
    /// Entries pushed onto the queue.
    pub pushed: u64,
    /// Frames not pushed.
    pub dropped: u64,
    /// Successful connections after the first.
    pub reconnects: u64,
}

// =============================================================================
// Feed Client
// =============================================================================

/// Exchange WebSocket to queue pump.
pub struct FeedClient<C> {
    config: FeedClientConfig,
    connector: C,
    supervisor: ConnectionSupervisor,
    state: RwLock<FeedState>,
}

impl<C> FeedClient<C>
where
    C: Connector,
    C::Handle: DurableQueue,
{
    /// Create a client. Nothing connects until [`FeedClient::run`].
    #[must_use]
    pub const fn new(config: FeedClientConfig, connector: C, supervisor: ConnectionSupervisor) -> Self {
        Self {
            config,
            connector,
            supervisor,
            state: RwLock::new(FeedState::Disconnected),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FeedState {
        *self.state.read()
    }

    fn cancel(&self) -> &CancellationToken {
        self.supervisor.cancel_token()
    }

    fn set_state(&self, next: FeedState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            tracing::info!(from = previous.as_str(), to = next.as_str(), "Feed state changed");
        }
    }

    /// Run until cancelled.
    pub async fn run(&self) -> FeedStats {
        let mut stats = FeedStats::default();

        tracing::info!(
            url = %self.config.url,
            queue = %self.config.queue,
            codes = ?self.config.codes,
            "Feed client starting"
        );

        let Some(mut queue) = self.supervisor.acquire(&self.connector).await else {
            return stats;
        };

        let mut reconnect = RetryPolicy::new(self.config.reconnect.clone());
        let mut connected_before = false;

        while !self.cancel().is_cancelled() {
            self.set_state(FeedState::Connecting);

            let attempt = tokio::select! {
                () = self.cancel().cancelled() => break,
                attempt = tokio::time::timeout(self.config.connect_timeout, self.connect()) => attempt,
            };

            let ws = match attempt.unwrap_or_else(|_| {
                Err(FeedClientError::ConnectTimeout(self.config.connect_timeout))
            }) {
                Ok(ws) => ws,
                Err(e) => {
                    self.set_state(FeedState::Disconnected);
                    let delay = reconnect.next_delay();
                    tracing::error!(
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "Feed connection failed"
                    );
                    metrics::record_connection_failure("upbit");

                    tokio::select! {
                        () = self.cancel().cancelled() => break,
                        () = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            reconnect.reset();
            if connected_before {
                stats.reconnects += 1;
                metrics::record_feed_reconnect();
            }
            connected_before = true;

            match self.stream(ws, &mut queue, &mut stats).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Feed disconnected, reconnecting");
                    self.set_state(FeedState::Disconnected);
                }
            }
        }

        self.set_state(FeedState::Disconnected);
        tracing::info!(stats = ?stats, "Feed client stopped");
        stats
    }

    /// Open the WebSocket and send the subscription.
    async fn connect(&self) -> Result<WsStream, FeedClientError> {
        let (mut ws, _response) = tokio_tungstenite::connect_async(self.config.url.as_str()).await?;

        let request = SubscriptionRequest::orderbook(self.config.codes.clone());
        ws.send(Message::Text(request.to_json()?.into())).await?;

        self.set_state(FeedState::Subscribed);
        tracing::debug!(codes = ?request.codes(), "Subscription sent");
        Ok(ws)
    }

    /// Receive until cancelled (`Ok`) or the connection fails (`Err`).
    async fn stream(
        &self,
        ws: WsStream,
        queue: &mut C::Handle,
        stats: &mut FeedStats,
    ) -> Result<(), FeedClientError> {
        self.set_state(FeedState::Streaming);
        let (mut write, mut read) = ws.split();

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(4);
        let heartbeat_cancel = self.cancel().child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat.clone(),
                heartbeat_state.clone(),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = self.cancel().cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                event = heartbeat_rx.recv() => match event {
                    Some(HeartbeatEvent::SendPing) => {
                        write.send(Message::Ping(Vec::new().into())).await?;
                    }
                    Some(HeartbeatEvent::Timeout) => return Err(FeedClientError::HeartbeatTimeout),
                    None => tracing::debug!("Heartbeat channel closed"),
                },
                msg = read.next() => {
                    let payload = match msg {
                        Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                        Some(Ok(Message::Binary(data))) => data.to_vec(),
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_traffic();
                            continue;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat_state.record_traffic();
                            write.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(Message::Frame(_))) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(FeedClientError::ConnectionClosed),
                    };

                    heartbeat_state.record_traffic();
                    if self.handle_frame(&payload, queue, stats).await.is_break() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Decode one frame and push it. Breaks only if cancelled while
    /// re-acquiring the queue.
    async fn handle_frame(
        &self,
        payload: &[u8],
        queue: &mut C::Handle,
        stats: &mut FeedStats,
    ) -> ControlFlow<()> {
        stats.frames += 1;
        metrics::record_feed_frame();

        let entry = match codec::decode(payload) {
            Ok(FeedFrame::Data(entry)) => entry,
            Ok(FeedFrame::Error { name, message }) => {
                tracing::error!(name = %name, message = %message, "Exchange reported an error");
                Self::drop_frame(stats, "exchange_error");
                return ControlFlow::Continue(());
            }
            Ok(FeedFrame::Status(status)) => {
                tracing::debug!(status = %status, "Exchange status");
                return ControlFlow::Continue(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable frame");
                Self::drop_frame(stats, "malformed");
                return ControlFlow::Continue(());
            }
        };

        match queue.push(&self.config.queue, &entry).await {
            Ok(()) => {
                stats.pushed += 1;
                metrics::record_queue_push(&self.config.queue);
                ControlFlow::Continue(())
            }
            Err(e) if e.is_connection() => {
                tracing::error!(error = %e, queue = %self.config.queue, "Queue connection lost, entry dropped");
                Self::drop_frame(stats, "queue_unavailable");
                match self.supervisor.acquire(&self.connector).await {
                    Some(fresh) => {
                        *queue = fresh;
                        ControlFlow::Continue(())
                    }
                    None => ControlFlow::Break(()),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, queue = %self.config.queue, "Queue rejected entry");
                Self::drop_frame(stats, "queue_rejected");
                ControlFlow::Continue(())
            }
        }
    }

    fn drop_frame(stats: &mut FeedStats, reason: &'static str) {
        stats.dropped += 1;
        metrics::record_feed_drop(reason);
    }
}
