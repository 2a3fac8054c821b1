//! Channel abstraction for tourclock.
//!
//! A channel is the set of connections attached to one event's clock.
//! Membership is keyed by connection identity, so joining twice never
//! duplicates a member. The manager is not stored: it is found by scanning
//! the current members each time a peer joins.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tourclock_protocol::{codec, ProtocolError, JOIN_SIGNAL};
use tourclock_transport::{ConnectionId, Outbound, TransportError};
use tracing::{debug, trace, warn};

/// A channel identifier (the event id).
pub type ChannelId = String;

/// A channel member as seen by the channel.
///
/// Holds only a weak reference to the connection; the owning session keeps
/// it alive.
#[derive(Clone)]
pub struct Member {
    id: ConnectionId,
    identity: String,
    manager: bool,
    connection: Weak<dyn Outbound>,
}

impl Member {
    /// Create a member entry for `connection`.
    #[must_use]
    pub fn new(connection: &Arc<dyn Outbound>, identity: impl Into<String>, manager: bool) -> Self {
        Self {
            id: connection.id().clone(),
            identity: identity.into(),
            manager,
            connection: Arc::downgrade(connection),
        }
    }

    /// Connection ID of this member.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Display identity declared on join.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Whether the member declared itself the clock manager.
    #[must_use]
    pub fn is_manager(&self) -> bool {
        self.manager
    }

    fn send(&self, text: &str) -> Result<(), TransportError> {
        match self.connection.upgrade() {
            Some(conn) => conn.send_text(text),
            None => Err(TransportError::ConnectionClosed),
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("manager", &self.manager)
            .finish()
    }
}

/// Result of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// `false` if the connection was already a member.
    pub inserted: bool,
    /// The manager the join signal was addressed to, if one was present.
    pub notified: Option<ConnectionId>,
    /// Whether the join signal was queued on the manager's connection.
    pub signal_sent: bool,
}

/// Result of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members the message was queued for.
    pub delivered: usize,
    /// Members whose send failed.
    pub failed: usize,
}

/// The members attached to one event's clock.
#[derive(Debug)]
pub struct Channel {
    /// Channel identifier.
    id: ChannelId,
    /// Current members indexed by connection.
    members: DashMap<ConnectionId, Member>,
}

impl Channel {
    /// Create a new, empty channel.
    #[must_use]
    pub fn new(id: impl Into<ChannelId>) -> Self {
        Self {
            id: id.into(),
            members: DashMap::new(),
        }
    }

    /// Get the channel id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the channel has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    /// The first manager found among current members, if any.
    #[must_use]
    pub fn manager(&self) -> Option<ConnectionId> {
        self.members
            .iter()
            .find(|m| m.is_manager())
            .map(|m| m.key().clone())
    }

    /// Identities of all current members.
    #[must_use]
    pub fn identities(&self) -> Vec<String> {
        self.members.iter().map(|m| m.identity.clone()).collect()
    }

    /// Add a member, then signal the first other manager found.
    ///
    /// A repeated join from the same connection replaces its identity and
    /// manager flag without changing the member count.
    pub fn join(&self, member: Member) -> JoinOutcome {
        let id = member.id.clone();
        let identity = member.identity.clone();
        let inserted = self.members.insert(id.clone(), member).is_none();

        let manager = self
            .members
            .iter()
            .find(|m| m.is_manager() && m.key() != &id)
            .map(|m| m.value().clone());

        debug!(
            channel = %self.id,
            connection = %id,
            identity = %identity,
            members = self.members.len(),
            "Member joined"
        );

        let mut signal_sent = false;
        let notified = manager.map(|m| {
            match m.send(JOIN_SIGNAL) {
                Ok(()) => {
                    signal_sent = true;
                    trace!(channel = %self.id, manager = %m.id, "Sent join signal");
                }
                Err(e) => warn!(channel = %self.id, manager = %m.id, error = %e, "Join signal failed"),
            }
            m.id
        });

        JoinOutcome {
            inserted,
            notified,
            signal_sent,
        }
    }

    /// Remove a member.
    ///
    /// Returns `true` if the connection was a member.
    pub fn leave(&self, id: &ConnectionId) -> bool {
        let removed = self.members.remove(id).is_some();
        if removed {
            debug!(
                channel = %self.id,
                connection = %id,
                members = self.members.len(),
                "Member left"
            );
        }
        removed
    }

    /// Serialize `message` once and send it to every member whose identity
    /// is not in `exclude`.
    ///
    /// # Errors
    ///
    /// Returns an error only if `message` cannot be serialized. Send
    /// failures are counted in the report.
    pub fn broadcast<T: Serialize + ?Sized>(
        &self,
        message: &T,
        exclude: &[&str],
    ) -> Result<BroadcastReport, ProtocolError> {
        let text = codec::encode_payload(message)?;
        Ok(self.broadcast_text(&text, exclude))
    }

    /// Send pre-encoded text to every member whose identity is not in
    /// `exclude`.
    pub fn broadcast_text(&self, text: &str, exclude: &[&str]) -> BroadcastReport {
        // Snapshot so no shard lock is held while sending.
        let recipients: Vec<Member> = self
            .members
            .iter()
            .filter(|m| !exclude.contains(&m.identity.as_str()))
            .map(|m| m.value().clone())
            .collect();

        let mut report = BroadcastReport::default();
        for member in &recipients {
            match member.send(text) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        channel = %self.id,
                        connection = %member.id,
                        error = %e,
                        "Relay send failed"
                    );
                }
            }
        }

        trace!(
            channel = %self.id,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast"
        );
        report
    }
}
