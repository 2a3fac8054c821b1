//! Event directory.
//!
//! Decides whether a connection may attach to an event's clock and which
//! channel it belongs to. The broker itself never checks this; the
//! WebSocket route consults the directory before upgrading.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tourclock_core::ChannelId;
use tracing::{debug, warn};

use crate::config::DirectoryConfig;

/// Maximum event handle length.
pub const MAX_HANDLE_LENGTH: usize = 256;

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Private,
    #[default]
    Public,
    Started,
    Ended,
    Canceled,
}

impl EventStatus {
    /// Whether clients may sync clocks for an event in this status.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, EventStatus::Public | EventStatus::Started)
    }

    /// Lowercase status name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Private => "private",
            EventStatus::Public => "public",
            EventStatus::Started => "started",
            EventStatus::Ended => "ended",
            EventStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Handle is malformed.
    #[error("Invalid event handle: {0}")]
    InvalidHandle(&'static str),

    /// No such event.
    #[error("Event not found: {0}")]
    NotFound(String),

    /// Event exists but does not allow clock sync.
    #[error("Event {id} is {status}")]
    NotLive { id: String, status: EventStatus },
}

impl DirectoryError {
    /// HTTP status to answer the upgrade request with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            DirectoryError::InvalidHandle(_) => StatusCode::BAD_REQUEST,
            DirectoryError::NotFound(_) => StatusCode::NOT_FOUND,
            DirectoryError::NotLive { .. } => StatusCode::FORBIDDEN,
        }
    }
}

/// Resolves a requested event handle to a channel id.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Resolve `handle`, checking the event allows live sync.
    async fn resolve(&self, handle: &str) -> Result<ChannelId, DirectoryError>;
}

/// Validate an event handle.
///
/// # Errors
///
/// Returns an error message if the handle is invalid.
pub fn validate_handle(handle: &str) -> Result<(), &'static str> {
    if handle.is_empty() {
        return Err("Event handle cannot be empty");
    }
    if handle.len() > MAX_HANDLE_LENGTH {
        return Err("Event handle too long");
    }
    if !handle.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Event handle contains invalid characters");
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct KnownEvent {
    id: String,
    status: EventStatus,
}

/// Directory backed by the events listed in configuration.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    open: bool,
    /// Events indexed by id and by handle.
    events: HashMap<String, KnownEvent>,
}

impl StaticDirectory {
    /// Build a directory from configuration.
    ///
    /// An event id always resolves to that event, even when another event
    /// lists the same string as its handle.
    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        let mut events: HashMap<String, KnownEvent> = HashMap::new();
        for event in &config.events {
            let Some(handle) = &event.handle else { continue };
            let known = KnownEvent {
                id: event.id.clone(),
                status: event.status,
            };
            if let Some(previous) = events.insert(handle.clone(), known) {
                warn!(
                    handle = %handle,
                    event = %event.id,
                    replaced = %previous.id,
                    "Duplicate event handle"
                );
            }
        }
        for event in &config.events {
            let known = KnownEvent {
                id: event.id.clone(),
                status: event.status,
            };
            if let Some(previous) = events.insert(event.id.clone(), known) {
                if previous.id != event.id {
                    warn!(
                        event = %event.id,
                        handle_of = %previous.id,
                        "Event id shadows another event's handle"
                    );
                }
            }
        }

        Self {
            open: config.open,
            events,
        }
    }

    /// A directory that accepts every valid handle as its own channel id.
    #[must_use]
    pub fn open() -> Self {
        Self {
            open: true,
            events: HashMap::new(),
        }
    }
}

#[async_trait]
impl EventDirectory for StaticDirectory {
    async fn resolve(&self, handle: &str) -> Result<ChannelId, DirectoryError> {
        validate_handle(handle).map_err(DirectoryError::InvalidHandle)?;

        match self.events.get(handle) {
            Some(event) if event.status.is_live() => Ok(event.id.clone()),
            Some(event) => Err(DirectoryError::NotLive {
                id: event.id.clone(),
                status: event.status,
            }),
            None if self.open => {
                debug!(handle = %handle, "Resolving unlisted event in open mode");
                Ok(handle.to_string())
            }
            None => Err(DirectoryError::NotFound(handle.to_string())),
        }
    }
}
