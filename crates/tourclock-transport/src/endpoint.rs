//! Endpoint fan-out.
//!
//! Connections are associated with an endpoint key (the path they
//! connected on) by the transport layer, independently of any channel
//! membership. A broadcast reaches every live connection on the key with
//! no exclusions and no notion of roles.

use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::traits::{ConnectionId, Outbound};

/// Fan-out of administrative notices to every connection on an endpoint.
#[derive(Default)]
pub struct EndpointBroadcaster {
    /// Endpoint key -> connections currently associated with it.
    endpoints: DashMap<String, DashMap<ConnectionId, Weak<dyn Outbound>>>,
}

impl EndpointBroadcaster {
    /// Create an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a connection with an endpoint key.
    pub fn associate(&self, key: &str, connection: &Arc<dyn Outbound>) {
        let id = connection.id().clone();
        self.endpoints
            .entry(key.to_string())
            .or_default()
            .insert(id.clone(), Arc::downgrade(connection));
        debug!(endpoint = %key, connection = %id, "Connection associated");
    }

    /// Remove a connection from an endpoint key. Empty keys are dropped.
    pub fn dissociate(&self, key: &str, id: &ConnectionId) {
        let removed = match self.endpoints.get(key) {
            Some(conns) => conns.remove(id).is_some(),
            None => false,
        };

        if removed {
            debug!(endpoint = %key, connection = %id, "Connection dissociated");
            self.endpoints.remove_if(key, |_, conns| conns.is_empty());
        }
    }

    /// Number of connections associated with `key`.
    #[must_use]
    pub fn connection_count(&self, key: &str) -> usize {
        self.endpoints.get(key).map(|c| c.len()).unwrap_or(0)
    }

    /// Number of endpoint keys with at least one connection.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Send `message` to every connection on `key`.
    ///
    /// Returns the number of connections the message was queued for.
    /// Send failures are logged and never reported to the caller.
    pub fn broadcast(&self, key: &str, message: &str) -> usize {
        let targets: Vec<(ConnectionId, Weak<dyn Outbound>)> = match self.endpoints.get(key) {
            Some(conns) => conns
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            None => {
                debug!(endpoint = %key, "Broadcast to endpoint with no connections");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, weak) in targets {
            let Some(conn) = weak.upgrade() else {
                dead.push(id);
                continue;
            };
            match conn.send_text(message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(endpoint = %key, connection = %id, error = %e, "Endpoint send failed"),
            }
        }

        for id in &dead {
            self.dissociate(key, id);
        }

        debug!(endpoint = %key, delivered, "Endpoint broadcast");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueuedConnection;

    fn connection(capacity: usize) -> (Arc<dyn Outbound>, tokio::sync::mpsc::Receiver<String>) {
        let (conn, rx) = QueuedConnection::channel(capacity);
        let conn: Arc<dyn Outbound> = Arc::new(conn);
        (conn, rx)
    }

    #[test]
    fn test_broadcast_reaches_all_on_endpoint() {
        let hub = EndpointBroadcaster::new();
        let (a, mut rx_a) = connection(4);
        let (b, mut rx_b) = connection(4);
        let (other, mut rx_other) = connection(4);

        hub.associate("/tours/1/clock", &a);
        hub.associate("/tours/1/clock", &b);
        hub.associate("/tours/2/clock", &other);

        assert_eq!(hub.broadcast("/tours/1/clock", "tour_updated_1"), 2);
        assert_eq!(rx_a.try_recv().unwrap(), "tour_updated_1");
        assert_eq!(rx_b.try_recv().unwrap(), "tour_updated_1");
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_unknown_endpoint() {
        let hub = EndpointBroadcaster::new();
        assert_eq!(hub.broadcast("/tours/9/clock", "x"), 0);
    }

    #[test]
    fn test_failed_send_does_not_stop_broadcast() {
        let hub = EndpointBroadcaster::new();
        let (dead, rx_dead) = connection(4);
        let (live, mut rx_live) = connection(4);
        drop(rx_dead);

        hub.associate("k", &dead);
        hub.associate("k", &live);

        assert_eq!(hub.broadcast("k", "ping"), 1);
        assert_eq!(rx_live.try_recv().unwrap(), "ping");
    }

    #[test]
    fn test_dropped_connections_are_pruned() {
        let hub = EndpointBroadcaster::new();
        let (a, _rx) = connection(4);
        hub.associate("k", &a);
        drop(a);

        assert_eq!(hub.broadcast("k", "ping"), 0);
        assert_eq!(hub.connection_count("k"), 0);
        assert_eq!(hub.endpoint_count(), 0);
    }

    #[test]
    fn test_dissociate() {
        let hub = EndpointBroadcaster::new();
        let (a, _rx_a) = connection(4);
        let (b, _rx_b) = connection(4);
        hub.associate("k", &a);
        hub.associate("k", &b);

        hub.dissociate("k", a.id());
        assert_eq!(hub.connection_count("k"), 1);

        // Unknown ids and keys are ignored.
        hub.dissociate("k", a.id());
        hub.dissociate("missing", b.id());

        hub.dissociate("k", b.id());
        assert_eq!(hub.endpoint_count(), 0);
    }
}
