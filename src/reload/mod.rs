//! Reload Module
//!
//! WebSocket-based hot update delivery for development clients.
//!
//! # Modules
//!
//! - `message` - wire protocol (connected, update, full-reload, error, custom)
//! - `broadcast` - connection registry and fan-out delivery
//! - `server` - WebSocket transport for the bundled dev server

pub mod broadcast;
pub mod message;
pub mod server;

pub use broadcast::{Broadcaster, Connection, ConnectionId, ConnectionState, SendError};
pub use message::{UpdateEntry, UpdateMessage};
