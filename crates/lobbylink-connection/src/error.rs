//! Error types for the connection layer.

use std::time::Duration;

use lobbylink_protocol::ProtocolError;

/// Errors surfaced to callers of the connection layer.
///
/// Transport failures never show up here directly: the supervisor absorbs
/// them and retries. Callers only see their effect (a request that was in
/// flight fails with `Closed`, the status moves to `Reconnecting`).
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connection is not in the `Connected` state.
    #[error("not connected")]
    NotConnected,

    /// The transport went away while the request was in flight.
    #[error("connection closed: {0}")]
    Closed(String),

    /// No reply arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The manager was torn down (or dropped) before the operation finished.
    #[error("connection manager shut down")]
    Shutdown,

    /// A request could not be encoded or its reply could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
