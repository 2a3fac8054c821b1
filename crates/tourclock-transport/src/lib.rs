//! # tourclock-transport
//!
//! Connection adapters for the tourclock synchronization broker.
//!
//! The broker never writes to a socket directly. Every physical connection
//! is wrapped in an [`Outbound`] capability whose `send_text` is
//! fire-and-forget: it queues the text or reports why it could not, and it
//! never panics or blocks.
//!
//! - **QueuedConnection** - bounded per-connection outbound queue
//! - **websocket** - pumps a queue into an axum WebSocket
//! - **EndpointBroadcaster** - fan-out to every connection on an endpoint
//!
//! ```rust
//! use tourclock_transport::{Outbound, QueuedConnection};
//!
//! let (conn, mut rx) = QueuedConnection::channel(8);
//! conn.send_text("join").unwrap();
//! assert_eq!(rx.try_recv().unwrap(), "join");
//! ```

pub mod endpoint;
pub mod queue;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use endpoint::EndpointBroadcaster;
pub use queue::QueuedConnection;
pub use traits::{ConnectionId, Outbound, TransportError};
