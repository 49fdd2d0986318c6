//! Upbit WebSocket Messages
//!
//! The quotation API takes a single JSON array per subscription:
//!
//! ```json
//! [{"ticket":"<uuid>"},{"type":"orderbook","codes":["KRW-BTC.1"],"isOnlyRealtime":true},{"format":"SIMPLE"}]
//! ```
//!
//! `SIMPLE` format abbreviates field names (`cd`, `tms`, `obu`, ...), which
//! is what [`RawFeedMessage`](crate::domain::tick::RawFeedMessage) reads.

use serde::{Deserialize, Serialize};

/// Stream type for order-book snapshots.
pub const ORDERBOOK: &str = "orderbook";

/// Abbreviated field-name format.
pub const SIMPLE_FORMAT: &str = "SIMPLE";

// =============================================================================
// Outbound
// =============================================================================

/// Identifies the subscribing client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    /// Opaque client identifier.
    pub ticket: String,
}

/// One stream type and the codes to receive for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamType {
    /// Stream type, e.g. `orderbook`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Qualified codes, e.g. `KRW-BTC.1`.
    pub codes: Vec<String>,
    /// Skip the initial snapshot and only send live updates.
    pub is_only_realtime: bool,
}

/// Response format selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Format {
    /// `DEFAULT` or `SIMPLE`.
    pub format: String,
}

/// Complete subscription request; serializes as a three-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest(pub Ticket, pub StreamType, pub Format);

impl SubscriptionRequest {
    /// Real-time order-book subscription for `codes` with a fresh ticket.
    #[must_use]
    pub fn orderbook(codes: Vec<String>) -> Self {
        Self::orderbook_with_ticket(uuid::Uuid::new_v4().to_string(), codes)
    }

    /// Same as [`SubscriptionRequest::orderbook`] with a fixed ticket.
    #[must_use]
    pub fn orderbook_with_ticket(ticket: String, codes: Vec<String>) -> Self {
        Self(
            Ticket { ticket },
            StreamType {
                kind: ORDERBOOK.to_string(),
                codes,
                is_only_realtime: true,
            },
            Format {
                format: SIMPLE_FORMAT.to_string(),
            },
        )
    }

    /// Subscribed codes.
    #[must_use]
    pub fn codes(&self) -> &[String] {
        &self.1.codes
    }

    /// Serialize for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound control messages
// =============================================================================

/// Body of an exchange error object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    /// Error code, e.g. `INVALID_PARAM`.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
}

/// `{"error": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorMessage {
    /// Error details.
    pub error: ErrorBody,
}

/// `{"status": "UP"}`, sent in reply to keep-alive text frames.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusMessage {
    /// Server status.
    pub status: String,
}
