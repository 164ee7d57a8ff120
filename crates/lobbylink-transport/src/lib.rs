//! Transport abstraction layer for lobbylink.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the way a client reaches the realtime service. The connection layer
//! above only ever sees these traits, so the reconnect logic can be driven
//! by a real WebSocket or by the in-memory pair in [`memory`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket connector via `tokio-tungstenite`
//! - `tls`: enables `wss://` endpoints (rustls with webpki roots)

mod error;
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{
    ConnectAttempt, MemoryConnection, MemoryConnector, MemoryListener,
    MemoryPeer,
};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens new outgoing connections to the realtime service.
///
/// Every call produces a brand new [`Connection`]. Callers never reuse a
/// connection once it has failed; they ask the connector for another one.
///
/// The futures are spelled out as `impl Future + Send` so that generic
/// code can drive them from a spawned Tokio task. Implementations are free
/// to write `async fn`.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a connection authenticated by the given session token.
    fn connect(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    /// Sends data to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    /// Must be cancel-safe: dropping the future before it completes
    /// loses no data.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
