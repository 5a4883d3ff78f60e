//! Transport boundary.
//!
//! The handshake core does not own sockets. The transport integration layer
//! (a WebSocket server, a TCP listener, or the simulation harness) implements
//! [`TransportSession`] for each accepted or opened connection and forwards
//! its lifecycle notifications to a [`crate::session::SessionHandler`].
//!
//! ```text
//! transport ──on_open/on_message/on_close/on_error──> SessionAdapter
//!     ↑                                                   │
//!     └───────────────── send(bytes) ─────────────────────┤
//!                                                         ↓
//!                                  SessionListener (pass-through, closed)
//! ```

use std::{fmt, io};

use async_trait::async_trait;
use bytes::Bytes;

/// Transport-assigned session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One transport connection
#[async_trait]
pub trait TransportSession: Send + Sync + 'static {
    /// Identifier of this session
    fn id(&self) -> SessionId;

    /// Peer address, for logs
    fn remote(&self) -> String;

    /// Send one complete frame to the peer
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the connection is closed or the write
    /// fails.
    async fn send(&self, bytes: Bytes) -> io::Result<()>;
}

/// Receives what the handshake core hands upward
#[async_trait]
pub trait SessionListener: Send + Sync + 'static {
    /// Application frame received after the handshake ended
    async fn on_message(&self, session: SessionId, bytes: Bytes);

    /// Session closed; its resources can be reclaimed
    async fn notify_closed(&self, session: SessionId);
}
