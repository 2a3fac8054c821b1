//! Process-wide channel registry.
//!
//! The registry is constructed once by whoever accepts connections and is
//! passed to every session by reference. It is the only place channels are
//! created, and creation is atomic per id: concurrent first requests for
//! the same id always resolve to one instance.

use crate::channel::{Channel, ChannelId};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Mapping from channel id to channel.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<ChannelId, Arc<Channel>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        info!("Creating channel registry");
        Self::default()
    }

    /// Get the channel for `id`, creating it if it does not exist.
    pub fn get_or_create(&self, id: &str) -> Arc<Channel> {
        if let Some(channel) = self.channels.get(id) {
            return Arc::clone(channel.value());
        }

        let entry = self.channels.entry(id.to_string()).or_insert_with(|| {
            debug!(channel = %id, "Creating new channel");
            Arc::new(Channel::new(id))
        });
        Arc::clone(entry.value())
    }

    /// Get the channel for `id` without creating it.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if no channel has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            channel_count: self.channels.len(),
            member_count: self.channels.iter().map(|c| c.member_count()).sum(),
        }
    }

    /// Remove channels that have no members and that no session holds.
    ///
    /// Runs under the map's shard locks, and `get_or_create` clones under
    /// the same locks, so a channel can only be removed while nothing else
    /// can reach it. Returns the number of channels removed.
    pub fn reap_idle(&self) -> usize {
        let mut removed = 0;
        self.channels.retain(|id, channel| {
            let idle = Arc::strong_count(channel) == 1 && channel.is_empty();
            if idle {
                debug!(channel = %id, "Removing idle channel");
                removed += 1;
            }
            !idle
        });
        removed
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of channels.
    pub channel_count: usize,
    /// Members across all channels.
    pub member_count: usize,
}
