//! Codec for decoding client messages and encoding relay payloads.
//!
//! All traffic is UTF-8 JSON text. Decoding checks the `type` tag before
//! deserializing the body so that unknown types are reported as such.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::messages::{ClientMessage, MessageType};

/// Maximum inbound message size (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds the size limit.
    #[error("Message size {size} exceeds maximum {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    /// Message has no string `type` field.
    #[error("Message has no type")]
    MissingType,

    /// Message type is not part of the protocol.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decode a client message using the default size limit.
///
/// # Errors
///
/// Returns an error if the text is not a well-formed `join` or `sync` message.
pub fn decode(text: &str) -> Result<ClientMessage, ProtocolError> {
    decode_with_limit(text, MAX_MESSAGE_SIZE)
}

/// Decode a client message, rejecting text longer than `limit` bytes.
///
/// # Errors
///
/// Returns an error if the text is too large, is not JSON, carries no
/// `type`, carries an unknown `type`, or has malformed fields.
pub fn decode_with_limit(text: &str, limit: usize) -> Result<ClientMessage, ProtocolError> {
    if text.len() > limit {
        return Err(ProtocolError::MessageTooLarge {
            size: text.len(),
            limit,
        });
    }

    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Decode)?;

    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    if MessageType::parse(tag).is_none() {
        return Err(ProtocolError::UnknownType(tag.to_string()));
    }

    serde_json::from_value(value).map_err(ProtocolError::Decode)
}

/// Serialize a relay payload to compact JSON text.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(payload).map_err(ProtocolError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_join() {
        let msg = decode(r#"{"type":"join","name":"alice","clockManager":true}"#).unwrap();
        assert_eq!(msg, ClientMessage::join("alice", true));
    }

    #[test]
    fn test_decode_sync() {
        let msg = decode(r#"{"type":"sync","data":{"elapsed":30}}"#).unwrap();
        assert_eq!(msg, ClientMessage::sync(json!({"elapsed": 30})));
    }

    #[test]
    fn test_decode_unknown_type() {
        match decode(r#"{"type":"leave"}"#) {
            Err(ProtocolError::UnknownType(t)) => assert_eq!(t, "leave"),
            other => panic!("Expected UnknownType error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_type() {
        assert!(matches!(decode(r#"{"name":"x"}"#), Err(ProtocolError::MissingType)));
        assert!(matches!(decode("[1,2]"), Err(ProtocolError::MissingType)));
        assert!(matches!(decode(r#"{"type":7}"#), Err(ProtocolError::MissingType)));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Decode(_))));
        // join without a name
        assert!(matches!(
            decode(r#"{"type":"join","clockManager":true}"#),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_message_too_large() {
        let text = format!(r#"{{"type":"sync","data":"{}"}}"#, "x".repeat(64));
        match decode_with_limit(&text, 16) {
            Err(ProtocolError::MessageTooLarge { limit, .. }) => assert_eq!(limit, 16),
            other => panic!("Expected MessageTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_payload() {
        assert_eq!(encode_payload(&json!({"elapsed": 30})).unwrap(), r#"{"elapsed":30}"#);
        assert_eq!(encode_payload(&Value::Null).unwrap(), "null");
    }
}
