//! Connection state machine and the events it publishes.

use std::fmt;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The lifecycle state of the realtime connection.
///
/// ```text
///                  ┌────────────── connect failed ─────────────┐
///                  ↓                                           │
/// Disconnected → Connecting ──ok──→ Connected ──drop──→ Reconnecting
///      ↑             ↑                                         │
///      │             └──────────── backoff elapsed ────────────┘
///      └──────────── disconnect() (from any state)
/// ```
///
/// There is no terminal state while the manager runs: retries go on until
/// `disconnect()` or a fresh `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if requests can be sent right now.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionStatus
// ---------------------------------------------------------------------------

/// Snapshot published on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful connect.
    /// Zero while connected.
    pub attempt_count: u32,
    /// Bumped on every successful connect. Anything issued on an older
    /// generation belongs to a transport that no longer exists.
    pub generation: u64,
}

impl ConnectionStatus {
    /// Returns `true` if the connection is up and still on `generation`.
    pub fn is_live(&self, generation: u64) -> bool {
        self.state.is_connected() && self.generation == generation
    }
}

/// Emitted once per unexpected transport drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// The generation that just ended.
    pub generation: u64,
    /// Human-readable reason, for logs.
    pub reason: String,
}
