//! Connection adapter traits for tourclock.
//!
//! Channels and endpoint broadcasts only ever see this interface, so they
//! are independent of the transport that actually carries the text.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Counter mixed into generated IDs so two connections accepted within the
/// same clock tick still differ.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection's outbound queue is full.
    #[error("Outbound queue full")]
    Backpressure,
}

/// The send side of one physical connection.
///
/// `send_text` must return quickly and must never panic: a failed write is
/// reported through the result so that a broadcast loop can log it and
/// move on to the next recipient.
pub trait Outbound: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Queue text for delivery to this connection.
    fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Check if the connection can still accept text.
    fn is_open(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_string() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }
}
