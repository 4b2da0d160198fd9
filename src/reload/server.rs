//! WebSocket Server for Hot Updates
//!
//! Bundled transport for the engine: accepts browser connections on a
//! local port and registers each one with the engine's broadcaster.
//!
//! The accept loop runs on its own thread; each accepted socket is
//! handshaken and wrapped in a [`WsConnection`]. Dead sockets are pruned
//! by the broadcaster on the first failed send.

use std::net::{IpAddr, TcpListener, TcpStream};

use anyhow::Result;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::broadcast::{Connection, ConnectionId, ConnectionState, SendError};
use super::message::UpdateMessage;
use crate::engine::HmrEngine;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

// =============================================================================
// WebSocket connection
// =============================================================================

/// A development client connected over WebSocket.
pub struct WsConnection {
    id: ConnectionId,
    state: ConnectionState,
    ws: WebSocket<TcpStream>,
}

impl WsConnection {
    /// Perform the WebSocket handshake on an accepted TCP stream.
    pub fn accept(stream: TcpStream) -> Result<Self> {
        let ws = tungstenite::accept(stream)?;
        Ok(Self {
            id: ConnectionId::next(),
            state: ConnectionState::Open,
            ws,
        })
    }
}

impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn send(&mut self, message: &UpdateMessage) -> Result<(), SendError> {
        self.ws
            .send(Message::Text(message.to_json().into()))
            .map_err(|e| {
                self.state = ConnectionState::Closed;
                SendError(e.to_string())
            })
    }

    fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            let _ = self.ws.close(None);
            self.state = ConnectionState::Closed;
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Start the WebSocket server and register accepted clients with the engine.
///
/// Returns the actual bound port (the base port is retried upward when in
/// use). The acceptor thread runs until the process exits; a closed engine
/// rejects new connections by closing them immediately.
pub fn start_ws_server(interface: IpAddr, base_port: u16, engine: HmrEngine) -> Result<u16> {
    let (listener, actual_port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    std::thread::spawn(move || {
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    crate::debug!("ws"; "client connected: {}", addr);

                    // Handshake wants blocking I/O
                    let _ = stream.set_nonblocking(false);

                    match WsConnection::accept(stream) {
                        Ok(conn) => engine.add_connection(Box::new(conn)),
                        Err(e) => {
                            crate::log!("ws"; "handshake failed: {}", e);
                        }
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    continue;
                }
                Err(e) => {
                    crate::log!("ws"; "accept error: {}", e);
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
        }
    });

    Ok(actual_port)
}

// =============================================================================
// Helpers
// =============================================================================

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind((interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
