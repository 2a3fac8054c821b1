//! Per-connection protocol state machine.
//!
//! A session is bound to one channel for its whole life. It becomes a
//! member only when the client sends `join`, relays `sync` payloads to the
//! other members, and leaves the channel when the connection closes.
//!
//! ```text
//! Unattached ──join──▶ Attached ──sync──▶ Attached
//!      │                   │
//!      └──────close────────┴──────▶ Closed
//! ```

use crate::channel::{BroadcastReport, Channel, JoinOutcome, Member};
use crate::registry::ChannelRegistry;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tourclock_protocol::{codec, ClientMessage, ProtocolError, MAX_MESSAGE_SIZE};
use tourclock_transport::{ConnectionId, Outbound};
use tracing::debug;

/// Session errors.
///
/// None of these are fatal to the connection; the caller logs them and
/// keeps reading.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed or unknown message.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// `sync` received before `join`.
    #[error("Sync received before join")]
    NotJoined,

    /// Message received after the connection closed.
    #[error("Session is closed")]
    Closed,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not yet a channel member.
    Unattached,
    /// Joined the channel with an identity.
    Attached,
    /// Connection gone.
    Closed,
}

/// What handling a message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session joined (or re-joined) its channel.
    Joined(JoinOutcome),
    /// A sync payload was relayed.
    Relayed(BroadcastReport),
}

/// One connection's participation in a channel.
pub struct MemberSession {
    connection: Arc<dyn Outbound>,
    channel: Arc<Channel>,
    identity: Option<String>,
    manager: bool,
    state: SessionState,
    max_message_size: usize,
}

impl MemberSession {
    /// Bind a connection to the channel `channel_id`, creating the channel
    /// if needed. The session is not a member until it receives `join`.
    #[must_use]
    pub fn new(registry: &ChannelRegistry, channel_id: &str, connection: Arc<dyn Outbound>) -> Self {
        let channel = registry.get_or_create(channel_id);
        debug!(channel = %channel.id(), connection = %connection.id(), "Session created");

        Self {
            connection,
            channel,
            identity: None,
            manager: false,
            state: SessionState::Unattached,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Set the largest inbound text accepted by [`handle_text`](Self::handle_text).
    #[must_use]
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    /// Connection ID of this session.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        self.connection.id()
    }

    /// The channel this session is bound to.
    #[must_use]
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identity declared by the last join, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Whether the last join declared this session the manager.
    #[must_use]
    pub fn is_manager(&self) -> bool {
        self.manager
    }

    /// Decode and handle one inbound text message.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed messages, a `sync` before `join`, or
    /// any message after close. The channel is left untouched in each case.
    pub fn handle_text(&mut self, text: &str) -> Result<SessionEvent, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        let message = codec::decode_with_limit(text, self.max_message_size)?;
        self.handle_message(message)
    }

    /// Handle one decoded message.
    ///
    /// # Errors
    ///
    /// Returns an error for a `sync` before `join` or any message after close.
    pub fn handle_message(&mut self, message: ClientMessage) -> Result<SessionEvent, SessionError> {
        match message {
            ClientMessage::Join {
                name,
                clock_manager,
            } => self.handle_join(name, clock_manager).map(SessionEvent::Joined),
            ClientMessage::Sync { data } => self.handle_sync(&data).map(SessionEvent::Relayed),
        }
    }

    fn handle_join(&mut self, name: String, manager: bool) -> Result<JoinOutcome, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        let member = Member::new(&self.connection, name.clone(), manager);
        self.identity = Some(name);
        self.manager = manager;
        self.state = SessionState::Attached;

        Ok(self.channel.join(member))
    }

    fn handle_sync(&mut self, data: &Value) -> Result<BroadcastReport, SessionError> {
        let identity = match (self.state, self.identity.as_deref()) {
            (SessionState::Attached, Some(identity)) => identity,
            (SessionState::Closed, _) => return Err(SessionError::Closed),
            _ => return Err(SessionError::NotJoined),
        };

        let report = self.channel.broadcast(data, &[identity])?;
        debug!(
            channel = %self.channel.id(),
            connection = %self.connection.id(),
            identity = %identity,
            recipients = report.delivered,
            "Relayed sync"
        );
        Ok(report)
    }

    /// The connection closed: leave the channel. Safe whether or not the
    /// session ever joined, and idempotent.
    pub fn handle_close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.channel.leave(self.connection.id());
        self.state = SessionState::Closed;
        debug!(channel = %self.channel.id(), connection = %self.connection.id(), "Session closed");
    }
}

impl Drop for MemberSession {
    fn drop(&mut self) {
        self.handle_close();
    }
}
