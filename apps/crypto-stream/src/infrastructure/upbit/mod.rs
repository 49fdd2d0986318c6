//! Upbit WebSocket Adapters
//!
//! - `client`: connection lifecycle and queue pump
//! - `codec`: frame decoding
//! - `heartbeat`: ping scheduling and dead-connection detection
//! - `messages`: subscription and control message types

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;

pub use client::{
    DEFAULT_CONNECT_TIMEOUT, FeedClient, FeedClientConfig, FeedClientError, FeedState, FeedStats,
};
pub use codec::{CodecError, FeedFrame};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::SubscriptionRequest;
