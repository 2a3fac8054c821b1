//! WebSocket transport implementation.
//!
//! Bridges an axum [`WebSocket`] to a [`QueuedConnection`]: the socket is
//! split, and a writer task forwards queued text to the sink until the
//! queue is dropped or the peer goes away.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::queue::QueuedConnection;
use crate::traits::{ConnectionId, Outbound};

/// A WebSocket attached to an outbound queue.
pub struct WsAttachment {
    /// Send side, shared with channels and endpoint broadcasts.
    pub connection: Arc<QueuedConnection>,
    /// Inbound half of the socket.
    pub inbound: SplitStream<WebSocket>,
    /// Task draining the queue into the socket.
    pub writer: JoinHandle<()>,
}

/// Split `socket` and start its writer task.
#[must_use]
pub fn attach(socket: WebSocket, queue_capacity: usize) -> WsAttachment {
    let (sink, inbound) = socket.split();
    let (connection, queue) = QueuedConnection::channel(queue_capacity);
    let connection = Arc::new(connection);

    let id = connection.id().clone();
    let writer = tokio::spawn(write_loop(id, sink, queue));

    WsAttachment {
        connection,
        inbound,
        writer,
    }
}

async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<String>,
) {
    while let Some(text) = queue.recv().await {
        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!(connection = %id, error = %e, "WebSocket write failed");
            // Stop accepting queued text so senders see the closed peer.
            queue.close();
            return;
        }
    }

    let _ = sink.close().await;
    debug!(connection = %id, "WebSocket writer finished");
}
