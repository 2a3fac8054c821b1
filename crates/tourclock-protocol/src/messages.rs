//! Message types for the tourclock protocol.
//!
//! Inbound messages are JSON objects tagged by a `type` field. Outbound
//! messages are either bare signals or a relayed sync payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Signal sent to a channel's manager when a peer joins.
pub const JOIN_SIGNAL: &str = "join";

/// Inbound message type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Join,
    Sync,
}

impl MessageType {
    /// Parse the value of a message's `type` field.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "join" => Some(MessageType::Join),
            "sync" => Some(MessageType::Sync),
            _ => None,
        }
    }

    /// The wire name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Join => "join",
            MessageType::Sync => "sync",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message sent by a client to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Attach to the channel under a display identity.
    #[serde(rename = "join")]
    Join {
        /// Display identity of the member.
        name: String,
        /// Whether this member is the authoritative clock source.
        #[serde(
            rename = "clockManager",
            default,
            deserialize_with = "strict_true"
        )]
        clock_manager: bool,
    },

    /// Clock state to relay to the other members.
    #[serde(rename = "sync")]
    Sync {
        /// Opaque clock payload, relayed verbatim.
        #[serde(default)]
        data: Value,
    },
}

impl ClientMessage {
    /// Get the message type.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::Join { .. } => MessageType::Join,
            ClientMessage::Sync { .. } => MessageType::Sync,
        }
    }

    /// Create a new Join message.
    #[must_use]
    pub fn join(name: impl Into<String>, clock_manager: bool) -> Self {
        ClientMessage::Join {
            name: name.into(),
            clock_manager,
        }
    }

    /// Create a new Sync message.
    #[must_use]
    pub fn sync(data: Value) -> Self {
        ClientMessage::Sync { data }
    }
}

/// Only a literal `true` marks a manager; any other value (string, number,
/// null) is treated as `false`.
fn strict_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value == Value::Bool(true))
}

/// Token broadcast to an event's endpoint when its metadata changes.
#[must_use]
pub fn resource_updated(event_id: &str) -> String {
    format!("tour_updated_{event_id}")
}

/// Endpoint key under which clock connections for an event are tracked.
#[must_use]
pub fn clock_endpoint(event_id: &str) -> String {
    format!("/tours/{event_id}/clock")
}
