//! Connection Registry and Broadcaster
//!
//! Manages the set of live development-client connections and fans update
//! messages out to them. Transport-agnostic: anything implementing
//! [`Connection`] can register, the bundled WebSocket transport lives in
//! [`super::server`].
//!
//! Sends are best-effort. A send to a connection that is not open is
//! swallowed, never retried; a transport failure on one connection drops
//! that connection without affecting the others.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use super::message::UpdateMessage;

// =============================================================================
// Connection interface
// =============================================================================

/// Opaque connection identity, assigned by [`ConnectionId::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Mint a fresh id. Monotonic per process.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Transport failure on a single connection.
#[derive(Debug, Error)]
#[error("send failed: {0}")]
pub struct SendError(pub String);

/// A live development-client connection.
///
/// Implementations map whatever callback or stream style the transport
/// uses onto this explicit send/state interface.
pub trait Connection: Send {
    fn id(&self) -> ConnectionId;

    fn state(&self) -> ConnectionState;

    /// Deliver a message. Only called while `state()` is `Open`; returning
    /// an error marks the connection dead and removes it from the registry.
    fn send(&mut self, message: &UpdateMessage) -> Result<(), SendError>;

    /// Release transport resources. Default: nothing to release.
    fn close(&mut self) {}
}

// =============================================================================
// Broadcaster
// =============================================================================

/// A registered connection plus its greeting status.
///
/// Connections added mid-handshake cannot be greeted yet; the flag makes
/// sure the `connected` message goes out on the first open observation.
struct Registered {
    conn: Box<dyn Connection>,
    greeted: bool,
}

impl Registered {
    /// Send the `connected` greeting if it is still owed.
    ///
    /// Returns `false` if the greeting failed and the connection was closed.
    fn greet(&mut self) -> bool {
        if self.greeted {
            return true;
        }
        if let Err(e) = self.conn.send(&UpdateMessage::Connected) {
            crate::debug!("ws"; "greeting failed for {}: {}", self.conn.id(), e);
            self.conn.close();
            return false;
        }
        self.greeted = true;
        true
    }
}

/// Registry of live connections with fan-out delivery.
#[derive(Default)]
pub struct Broadcaster {
    connections: Mutex<Vec<Registered>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and greet it with a `connected` message.
    ///
    /// A connection still handshaking is registered ungreeted; the
    /// greeting is delivered on the first broadcast that finds it open.
    pub fn add(&self, conn: Box<dyn Connection>) {
        let mut entry = Registered {
            conn,
            greeted: false,
        };
        if entry.conn.state() == ConnectionState::Open && !entry.greet() {
            return;
        }

        let mut connections = self.connections.lock();
        crate::debug!("ws"; "client {} connected (total: {})", entry.conn.id(), connections.len() + 1);
        connections.push(entry);
    }

    /// Remove a connection by id, closing its transport.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock();
        let Some(pos) = connections.iter().position(|e| e.conn.id() == id) else {
            return false;
        };
        let mut entry = connections.remove(pos);
        entry.conn.close();
        true
    }

    /// Fan a message out to every open connection.
    ///
    /// Connections that are not open are skipped; connections whose send
    /// fails are dropped from the registry. An ungreeted connection that
    /// has finished its handshake receives `connected` first.
    pub fn broadcast(&self, message: &UpdateMessage) {
        let mut connections = self.connections.lock();
        let count = connections.len();

        if count == 0 {
            crate::debug!("ws"; "no clients connected");
            return;
        }

        connections.retain_mut(|entry| match entry.conn.state() {
            ConnectionState::Open => {
                if !entry.greet() {
                    return false;
                }
                match entry.conn.send(message) {
                    Ok(()) => true,
                    Err(e) => {
                        crate::debug!("ws"; "client {} dropped: {}", entry.conn.id(), e);
                        entry.conn.close();
                        false
                    }
                }
            }
            // Still handshaking: keep it, skip this message
            ConnectionState::Connecting => true,
            // Dead transport: prune
            ConnectionState::Closed => false,
        });

        crate::debug!("ws"; "broadcast to {} clients", count);
    }

    /// Close and drop every connection.
    pub fn close_all(&self) {
        let mut connections = self.connections.lock();
        for mut entry in connections.drain(..) {
            entry.conn.close();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }
}

// =============================================================================
// Test support
// =============================================================================


// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::testing::MockConnection;
    use super::*;

    #[test]
    fn new_connection_is_greeted() {
        let broadcaster = Broadcaster::new();
        let (conn, sent) = MockConnection::open();
        broadcaster.add(Box::new(conn));

        let messages = sent.lock();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], UpdateMessage::Connected));
    }

    #[test]
    fn closed_connection_is_skipped_and_others_receive() {
        let broadcaster = Broadcaster::new();
        let (open_conn, open_sent) = MockConnection::open();
        let (closed_conn, closed_sent) = MockConnection::closed();
        broadcaster.add(Box::new(open_conn));
        broadcaster.add(Box::new(closed_conn));

        broadcaster.broadcast(&UpdateMessage::FullReload);

        // Open client got the greeting plus the reload
        assert_eq!(open_sent.lock().len(), 2);
        // Closed client got nothing, and no panic occurred
        assert!(closed_sent.lock().is_empty());
    }

    #[test]
    fn handshaking_connection_is_greeted_once_open() {
        let broadcaster = Broadcaster::new();
        let (conn, state, sent) = MockConnection::connecting();
        broadcaster.add(Box::new(conn));

        // Nothing delivered while the handshake is in flight
        broadcaster.broadcast(&UpdateMessage::FullReload);
        assert!(sent.lock().is_empty());
        assert_eq!(broadcaster.connection_count(), 1);

        *state.lock() = ConnectionState::Open;
        broadcaster.broadcast(&UpdateMessage::FullReload);

        // Greeting lands before the first regular message
        let messages = sent.lock();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], UpdateMessage::Connected));
        assert!(matches!(messages[1], UpdateMessage::FullReload));
    }

    #[test]
    fn failing_connection_is_dropped_without_affecting_others() {
        let broadcaster = Broadcaster::new();
        broadcaster.add(Box::new(MockConnection::failing()));
        let (good, good_sent) = MockConnection::open();
        broadcaster.add(Box::new(good));

        // Greeting already dropped the failing connection
        assert_eq!(broadcaster.connection_count(), 1);

        broadcaster.broadcast(&UpdateMessage::FullReload);
        assert_eq!(broadcaster.connection_count(), 1);
        assert_eq!(good_sent.lock().len(), 2);
    }

    #[test]
    fn remove_by_id() {
        let broadcaster = Broadcaster::new();
        let (conn, _) = MockConnection::open();
        let id = conn.conn_id();
        broadcaster.add(Box::new(conn));

        assert!(broadcaster.remove(id));
        assert!(!broadcaster.remove(id));
        assert_eq!(broadcaster.connection_count(), 0);
    }

    #[test]
    fn close_all_drains_registry() {
        let broadcaster = Broadcaster::new();
        let (a, _) = MockConnection::open();
        let (b, _) = MockConnection::open();
        broadcaster.add(Box::new(a));
        broadcaster.add(Box::new(b));

        broadcaster.close_all();
        assert_eq!(broadcaster.connection_count(), 0);
    }
}
