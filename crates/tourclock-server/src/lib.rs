//! # tourclock-server
//!
//! HTTP and WebSocket front end for the tourclock broker.
//!
//! - `GET /tours/:tour/clock` - clock sync WebSocket (tour id or handle)
//! - `POST /tours/:tour/updated` - notify an event's connections that it changed
//! - `GET /health` - liveness and counts

pub mod config;
pub mod directory;
pub mod handlers;
pub mod metrics;
