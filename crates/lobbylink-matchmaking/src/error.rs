//! Error types for matchmaking.

use lobbylink_connection::ConnectionError;
use lobbylink_protocol::ProtocolError;

/// Errors that can occur while joining or leaving the queue.
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    /// The connection was not `Connected` when the call was made.
    #[error("not connected to the realtime service")]
    NotConnected,

    /// The server refused the request.
    #[error("matchmaker rejected the request ({code}): {message}")]
    Rejected { code: i32, message: String },

    /// The connection failed while the request was in flight.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The server answered with something that doesn't fit the request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
