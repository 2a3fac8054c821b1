//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (TOURCLOCK_HOST, TOURCLOCK_PORT)
//! - TOML configuration file
//! - `--config <path>` on the command line

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::directory::EventStatus;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Channel registry housekeeping.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Which events accept clock connections.
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Outbound queue capacity per connection.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

/// Registry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Seconds between idle channel sweeps. 0 keeps channels forever.
    #[serde(default)]
    pub reap_interval_secs: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Event directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Accept any handle not listed in `events`, using it as the channel id.
    #[serde(default = "default_true")]
    pub open: bool,

    /// Known events.
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

/// A known event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Event id, used as the channel id.
    pub id: String,

    /// Optional human-readable handle that also resolves to this event.
    #[serde(default)]
    pub handle: Option<String>,

    /// Event status; only public and started events allow clock sync.
    #[serde(default)]
    pub status: EventStatus,
}

// Default value functions
fn default_host() -> String {
    std::env::var("TOURCLOCK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("TOURCLOCK_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3002)
}

fn default_true() -> bool {
    true
}

fn default_max_message_size() -> usize {
    tourclock_protocol::MAX_MESSAGE_SIZE
}

fn default_outbound_queue() -> usize {
    tourclock_transport::queue::DEFAULT_QUEUE_CAPACITY
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            limits: LimitsConfig::default(),
            registry: RegistryConfig::default(),
            metrics: MetricsConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            open: true,
            events: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the first default path that exists, or
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "tourclock.toml",
            "/etc/tourclock/tourclock.toml",
            "~/.config/tourclock/tourclock.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}
