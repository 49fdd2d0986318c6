//! Order-Book Ticks
//!
//! Wire shape of an Upbit `SIMPLE`-format order-book snapshot and the
//! normalized tick the loader persists.
//!
//! # Wire Format (JSON, abbreviated)
//!
//! ```json
//! {
//!   "ty": "orderbook",
//!   "cd": "KRW-BTC",
//!   "tms": 1700000000123,
//!   "tas": 4.1, "tbs": 9.7,
//!   "obu": [{"ap": 11, "as": 2, "bp": 10, "bs": 1}],
//!   "st": "REALTIME"
//! }
//! ```
//!
//! Only the code, the timestamp and the first order-book unit are used.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Number of fractional digits when converting milliseconds to seconds.
const MILLIS_SCALE: u32 = 3;

/// Errors produced while turning a queue entry into a tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The entry is not a valid order-book JSON document.
    #[error("malformed entry: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The snapshot carries no order-book units.
    #[error("order book for {0} has no units")]
    EmptyOrderbook(String),

    /// The market code has no asset part (expected `MARKET-ASSET`).
    #[error("cannot derive asset from code {0:?}")]
    InvalidCode(String),

    /// The timestamp cannot be represented as a UTC instant.
    #[error("timestamp {0}ms is out of range")]
    TimestampOutOfRange(i64),
}

/// One price level of the order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookUnit {
    /// Ask price.
    #[serde(rename = "ap")]
    pub ask_price: Decimal,
    /// Ask size.
    #[serde(rename = "as")]
    pub ask_size: Decimal,
    /// Bid price.
    #[serde(rename = "bp")]
    pub bid_price: Decimal,
    /// Bid size.
    #[serde(rename = "bs")]
    pub bid_size: Decimal,
}

/// Order-book snapshot as received from the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeedMessage {
    /// Market code, e.g. `KRW-BTC`.
    #[serde(rename = "cd")]
    pub code: String,
    /// Exchange timestamp in milliseconds since the Unix epoch.
    #[serde(rename = "tms")]
    pub timestamp_ms: i64,
    /// Order-book units, best level first.
    #[serde(rename = "obu", default)]
    pub units: Vec<OrderbookUnit>,
}

impl RawFeedMessage {
    /// Parse a queue entry.
    ///
    /// Unknown fields are ignored; the entry is the exchange payload verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Malformed`] if the entry is not a snapshot.
    pub fn from_entry(entry: &str) -> Result<Self, TickError> {
        Ok(serde_json::from_str(entry)?)
    }

    /// Asset part of the market code (`KRW-BTC` → `BTC`).
    ///
    /// # Errors
    ///
    /// Returns [`TickError::InvalidCode`] when the code has no `-` separator
    /// or nothing after it.
    pub fn asset(&self) -> Result<&str, TickError> {
        match self.code.split_once('-') {
            Some((_, asset)) if !asset.is_empty() => Ok(asset),
            _ => Err(TickError::InvalidCode(self.code.clone())),
        }
    }
}

/// Canonical record stored by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTick {
    /// Asset code without market prefix.
    pub asset: String,
    /// Exchange timestamp in seconds (millisecond precision).
    pub timestamp: Decimal,
    /// Best bid price.
    pub bid_price: Decimal,
    /// Volume at the best bid.
    pub bid_volume: Decimal,
    /// Best ask price.
    pub ask_price: Decimal,
    /// Volume at the best ask.
    pub ask_volume: Decimal,
}

impl NormalizedTick {
    /// Derive a tick from the top level of a snapshot.
    ///
    /// Pure and deterministic: the timestamp is exactly `tms / 1000`.
    ///
    /// # Errors
    ///
    /// Fails when the code has no asset part, the book is empty, or the
    /// timestamp is outside chrono's representable range.
    pub fn transform(raw: &RawFeedMessage) -> Result<Self, TickError> {
        let asset = raw.asset()?;
        let top = raw
            .units
            .first()
            .ok_or_else(|| TickError::EmptyOrderbook(raw.code.clone()))?;

        if DateTime::<Utc>::from_timestamp_millis(raw.timestamp_ms).is_none() {
            return Err(TickError::TimestampOutOfRange(raw.timestamp_ms));
        }

        Ok(Self {
            asset: asset.to_string(),
            timestamp: Decimal::new(raw.timestamp_ms, MILLIS_SCALE),
            bid_price: top.bid_price,
            bid_volume: top.bid_size,
            ask_price: top.ask_price,
            ask_volume: top.ask_size,
        })
    }

    /// Parse and transform a queue entry in one step.
    ///
    /// # Errors
    ///
    /// See [`RawFeedMessage::from_entry`] and [`NormalizedTick::transform`].
    pub fn from_entry(entry: &str) -> Result<Self, TickError> {
        Self::transform(&RawFeedMessage::from_entry(entry)?)
    }

    /// UTC calendar date of the tick's timestamp.
    ///
    /// Ticks built by [`NormalizedTick::transform`] always have a valid
    /// timestamp; hand-built ticks outside the range fall back to the epoch.
    #[must_use]
    pub fn utc_date(&self) -> NaiveDate {
        self.timestamp
            .checked_mul(Decimal::ONE_THOUSAND)
            .and_then(|millis| millis.trunc().to_i64())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(DateTime::UNIX_EPOCH)
            .date_naive()
    }
}
