//! Error types for the session layer.

use lobbylink_protocol::ProtocolError;

/// Errors from the local key/value storage backing the device identity.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing storage failed.
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The key contains characters the store cannot represent.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// The store is not usable at all (e.g. no writable location).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while establishing a session.
///
/// None of these are retried by the session layer. The caller decides
/// what to do (typically: show the login screen again).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The device identity could not be read or persisted.
    #[error("device identity unavailable: {0}")]
    Storage(#[from] StorageError),

    /// The remote side rejected the authentication or could not be reached.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The authentication reply could not be understood.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
