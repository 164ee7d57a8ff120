//! Unified error type for lobbylink.

use lobbylink_connection::ConnectionError;
use lobbylink_matchmaking::MatchmakingError;
use lobbylink_protocol::ProtocolError;
use lobbylink_session::{SessionError, StorageError};
use lobbylink_transport::TransportError;

/// Configuration could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The port is not a number in `0..=65535`.
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// A boolean setting has a value that is neither on nor off.
    #[error("invalid value {value:?} for {name}")]
    InvalidFlag { name: String, value: String },

    /// A numeric setting is not a positive whole number.
    #[error("invalid number {value:?} for {name}")]
    InvalidNumber { name: String, value: String },
}

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `lobbylink` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LobbylinkError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Device identity storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Login failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The realtime connection failed or was shut down.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Joining or leaving the queue failed.
    #[error(transparent)]
    Matchmaking(#[from] MatchmakingError),

    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The operation needs a session and there is none.
    #[error("not logged in")]
    NotLoggedIn,
}
