//! Queue-backed connection adapter.
//!
//! Text handed to a [`QueuedConnection`] lands in a bounded mpsc queue.
//! Whatever owns the receiving half (a WebSocket writer task, or a test)
//! drains it at its own pace.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use crate::traits::{ConnectionId, Outbound, TransportError};

/// Default outbound queue capacity per connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A connection adapter backed by a bounded queue.
#[derive(Debug)]
pub struct QueuedConnection {
    id: ConnectionId,
    sender: mpsc::Sender<String>,
    open: AtomicBool,
}

impl QueuedConnection {
    /// Create an adapter with a generated ID and return it with the
    /// receiving half of its queue.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        Self::with_id(ConnectionId::generate(), capacity)
    }

    /// Create an adapter with a specific ID.
    #[must_use]
    pub fn with_id(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id,
            sender,
            open: AtomicBool::new(true),
        };
        (conn, receiver)
    }

    /// Mark the adapter closed. Later sends fail with
    /// [`TransportError::ConnectionClosed`].
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Outbound for QueuedConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        match self.sender.try_send(text.to_owned()) {
            Ok(()) => {
                trace!(connection = %self.id, bytes = text.len(), "Queued outbound text");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(TransportError::Backpressure),
            Err(TrySendError::Closed(_)) => {
                self.open.store(false, Ordering::SeqCst);
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let (conn, mut rx) = QueuedConnection::channel(4);
        conn.send_text("hello").unwrap();
        conn.send_text("world").unwrap();

        assert_eq!(rx.try_recv().unwrap(), "hello");
        assert_eq!(rx.try_recv().unwrap(), "world");
        assert!(conn.is_open());
    }

    #[test]
    fn test_backpressure() {
        let (conn, _rx) = QueuedConnection::channel(1);
        conn.send_text("one").unwrap();
        assert!(matches!(conn.send_text("two"), Err(TransportError::Backpressure)));
        // Still open, the writer may catch up.
        assert!(conn.is_open());
    }

    #[test]
    fn test_receiver_dropped() {
        let (conn, rx) = QueuedConnection::channel(4);
        drop(rx);

        assert!(matches!(conn.send_text("x"), Err(TransportError::ConnectionClosed)));
        assert!(!conn.is_open());
    }

    #[test]
    fn test_close() {
        let (conn, mut rx) = QueuedConnection::channel(4);
        conn.close();

        assert!(matches!(conn.send_text("x"), Err(TransportError::ConnectionClosed)));
        assert!(rx.try_recv().is_err());
    }
}
