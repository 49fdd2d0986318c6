//! Frame Codec
//!
//! Upbit sends data as binary WebSocket frames holding UTF-8 JSON; text
//! frames are accepted too. Each frame is one JSON object: a data payload,
//! an error object, or a status reply.

use super::messages::{ErrorMessage, StatusMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is JSON but not an object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// A decoded feed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// Market data, re-serialized compactly for the queue.
    Data(String),
    /// Exchange-reported error.
    Error {
        /// Error code.
        name: String,
        /// Description.
        message: String,
    },
    /// Server status reply.
    Status(String),
}

/// Decode one frame payload.
///
/// # Errors
///
/// Returns an error if the payload is not a JSON object.
pub fn decode(payload: &[u8]) -> Result<FeedFrame, CodecError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;

    let Some(object) = value.as_object() else {
        return Err(CodecError::InvalidFormat(format!(
            "expected JSON object, got {}",
            json_kind(&value)
        )));
    };

    if object.contains_key("error") {
        let msg: ErrorMessage = serde_json::from_value(value)?;
        return Ok(FeedFrame::Error {
            name: msg.error.name,
            message: msg.error.message,
        });
    }

    if object.len() == 1 && object.contains_key("status") {
        let msg: StatusMessage = serde_json::from_value(value)?;
        return Ok(FeedFrame::Status(msg.status));
    }

    Ok(FeedFrame::Data(serde_json::to_string(&value)?))
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
