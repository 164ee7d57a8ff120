//! Session types: what the client holds once it has authenticated.
//!
//! A "session" is the client's proof of who it is. It tracks:
//! - WHO the player is (`username`, as the server knows it)
//! - HOW to prove it again (an opaque `token`)

use std::fmt;
use std::time::SystemTime;

use lobbylink_protocol::AuthReply;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An authenticated context: token plus display name.
///
/// At most one `Session` is live per [`AuthSession`](crate::AuthSession).
/// The token is opaque; the client never looks inside it, it only hands it
/// to the connection layer.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    username: String,
}

impl Session {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl From<AuthReply> for Session {
    fn from(reply: AuthReply) -> Self {
        Self::new(reply.token, reply.username)
    }
}

/// Tokens are credentials, so `Debug` only shows the username.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RestoredSession
// ---------------------------------------------------------------------------

/// A session rebuilt locally from a previously issued token.
///
/// Restoring does no I/O and doesn't validate anything: whether the token
/// is still accepted is only known when the connection layer uses it.
#[derive(Clone)]
pub struct RestoredSession {
    token: String,
    restored_at: SystemTime,
}

impl RestoredSession {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Wall-clock time the session was restored.
    pub fn restored_at(&self) -> SystemTime {
        self.restored_at
    }
}

impl fmt::Debug for RestoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoredSession")
            .field("token", &"<redacted>")
            .field("restored_at", &self.restored_at)
            .finish()
    }
}

/// Rebuilds a session object from a token. Pure and local.
pub fn restore_session(token: &str) -> RestoredSession {
    RestoredSession {
        token: token.to_string(),
        restored_at: SystemTime::now(),
    }
}
