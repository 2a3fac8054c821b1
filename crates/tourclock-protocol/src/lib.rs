//! # tourclock-protocol
//!
//! Wire protocol definitions for the tourclock synchronization broker.
//!
//! Clients talk to the broker with small JSON text frames:
//!
//! - `join` - attach to the event's clock channel, optionally as the manager
//! - `sync` - relay a clock snapshot to every other member of the channel
//!
//! The broker answers with bare text signals rather than structured frames:
//! `"join"` tells the manager that a peer arrived, and `tour_updated_<id>`
//! tells every connection on an event endpoint that the event changed.
//!
//! ## Example
//!
//! ```rust
//! use tourclock_protocol::{codec, ClientMessage};
//!
//! let msg = codec::decode(r#"{"type":"join","name":"alice","clockManager":true}"#).unwrap();
//! assert_eq!(msg, ClientMessage::join("alice", true));
//! ```

pub mod codec;
pub mod messages;

pub use codec::{decode, encode_payload, ProtocolError, MAX_MESSAGE_SIZE};
pub use messages::{clock_endpoint, resource_updated, ClientMessage, MessageType, JOIN_SIGNAL};
