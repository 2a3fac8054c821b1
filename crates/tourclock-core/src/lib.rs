//! # tourclock-core
//!
//! Channel membership and sync relay for the tourclock broker.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Channel** - the members attached to one event's clock
//! - **ChannelRegistry** - lazily populated map from event id to channel
//! - **MemberSession** - per-connection protocol state machine
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Connection │────▶│  MemberSession  │────▶│   Channel   │
//! └─────────────┘     └─────────────────┘     └─────────────┘
//!                              │                     ▲
//!                              ▼                     │
//!                     ┌─────────────────┐            │
//!                     │ ChannelRegistry │────────────┘
//!                     └─────────────────┘
//! ```
//!
//! One member per channel may declare itself the clock manager. When a
//! peer joins, the first manager found is sent a `"join"` signal so it can
//! push a fresh snapshot; every `sync` is relayed to all other members.

pub mod channel;
pub mod registry;
pub mod session;

pub use channel::{BroadcastReport, Channel, ChannelId, JoinOutcome, Member};
pub use registry::{ChannelRegistry, RegistryStats};
pub use session::{MemberSession, SessionError, SessionEvent, SessionState};
