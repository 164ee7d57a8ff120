//! `MatchmakingClient`: queue tickets on top of a connection handle.

use lobbylink_connection::{ConnectionError, ConnectionHandle};
use lobbylink_protocol::{ClientRequest, MatchmakerAdd, ProtocolError, QueueMode, ServerMessage};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::MatchmakingError;

// ---------------------------------------------------------------------------
// MatchmakerConfig
// ---------------------------------------------------------------------------

/// How many players a match needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchmakerConfig {
    /// Fewest players the server may match together.
    pub min_count: u32,
    /// Most players the server may match together.
    pub max_count: u32,
}

/// Two-player matches.
impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            min_count: 2,
            max_count: 2,
        }
    }
}

impl MatchmakerConfig {
    /// Returns a config with `max_count >= min_count`.
    pub fn validated(mut self) -> Self {
        if self.max_count < self.min_count {
            warn!(
                min = self.min_count,
                max = self.max_count,
                "max_count below min_count, raising it"
            );
            self.max_count = self.min_count;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// QueueTicket
// ---------------------------------------------------------------------------

/// Handle for one pending matchmaking request.
///
/// A ticket belongs to the connection generation it was issued on. As soon
/// as that connection leaves `Connected`, the server has forgotten the
/// ticket and so does the client: it is no longer live, `dequeue` on it is
/// a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTicket {
    id: String,
    mode: QueueMode,
    generation: u64,
}

impl QueueTicket {
    /// The server-assigned ticket id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// The connection generation this ticket was issued on.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// The server matched a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFound {
    /// Which ticket was matched.
    pub ticket: String,
    /// The authoritative match to join, if the server created one.
    pub match_id: Option<String>,
    /// Token for joining a relayed match, if the server issued one.
    pub token: Option<String>,
}

impl MatchFound {
    /// Returns `true` if this match is for `ticket`.
    pub fn is_for(&self, ticket: &QueueTicket) -> bool {
        self.ticket == ticket.id
    }
}

/// A stream of [`MatchFound`] events.
///
/// Only matches pushed after the subscription was created are seen.
pub struct MatchSubscription {
    pushes: broadcast::Receiver<ServerMessage>,
}

impl MatchSubscription {
    /// Waits for the next match. Other server pushes are skipped.
    ///
    /// Returns `None` once the connection is gone for good.
    pub async fn recv(&mut self) -> Option<MatchFound> {
        loop {
            match self.pushes.recv().await {
                Ok(ServerMessage::MatchmakerMatched(matched)) => {
                    return Some(MatchFound {
                        ticket: matched.ticket,
                        match_id: matched.match_id,
                        token: matched.token,
                    });
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "match subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MatchmakingClient
// ---------------------------------------------------------------------------

/// Joins and leaves the matchmaking queue.
///
/// Each call is exactly one request/reply round-trip with no retries. The
/// client keeps no registry of tickets; liveness comes from the
/// connection's generation.
#[derive(Debug, Clone)]
pub struct MatchmakingClient {
    connection: ConnectionHandle,
    config: MatchmakerConfig,
}

impl MatchmakingClient {
    pub fn new(connection: ConnectionHandle, config: MatchmakerConfig) -> Self {
        Self {
            connection,
            config: config.validated(),
        }
    }

    /// Joins the queue for `mode`.
    ///
    /// # Errors
    /// - [`MatchmakingError::NotConnected`] if the connection is not
    ///   `Connected` right now (nothing is sent)
    /// - [`MatchmakingError::Rejected`] if the server refused
    /// - [`MatchmakingError::Connection`] if the connection failed mid-request
    pub async fn enqueue(&self, mode: QueueMode) -> Result<QueueTicket, MatchmakingError> {
        if !self.connection.status().state.is_connected() {
            return Err(MatchmakingError::NotConnected);
        }

        let add = MatchmakerAdd::for_mode(mode, self.config.min_count, self.config.max_count);
        let reply = self
            .connection
            .request(ClientRequest::MatchmakerAdd(add))
            .await
            .map_err(from_connection)?;

        match reply.message {
            ServerMessage::MatchmakerTicket { ticket } => {
                info!(%ticket, %mode, generation = reply.generation, "joined matchmaking queue");
                Ok(QueueTicket {
                    id: ticket,
                    mode,
                    generation: reply.generation,
                })
            }
            ServerMessage::Error { code, message } => {
                warn!(code, %message, %mode, "matchmaker rejected enqueue");
                Err(MatchmakingError::Rejected { code, message })
            }
            other => Err(unexpected("matchmaker_add", &other)),
        }
    }

    /// Leaves the queue.
    ///
    /// A ticket that is no longer live (its connection is gone) is already
    /// void on the server, so this returns `Ok(())` without sending
    /// anything.
    ///
    /// # Errors
    /// - [`MatchmakingError::Rejected`] if the server refused
    /// - [`MatchmakingError::Connection`] if the connection failed mid-request
    pub async fn dequeue(&self, ticket: &QueueTicket) -> Result<(), MatchmakingError> {
        if !self.is_live(ticket) {
            debug!(ticket = %ticket.id, "ticket no longer live, nothing to remove");
            return Ok(());
        }

        let reply = match self
            .connection
            .request(ClientRequest::remove(ticket.id.clone()))
            .await
        {
            Ok(reply) => reply,
            // Lost the connection between the check and the send.
            Err(ConnectionError::NotConnected) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match reply.message {
            ServerMessage::Ack => {
                info!(ticket = %ticket.id, "left matchmaking queue");
                Ok(())
            }
            ServerMessage::Error { code, message } => {
                warn!(code, %message, ticket = %ticket.id, "matchmaker rejected dequeue");
                Err(MatchmakingError::Rejected { code, message })
            }
            other => Err(unexpected("matchmaker_remove", &other)),
        }
    }

    /// Returns `true` if `ticket` still belongs to the current connection.
    pub fn is_live(&self, ticket: &QueueTicket) -> bool {
        self.connection.is_live(ticket.generation)
    }

    /// Subscribes to match notifications.
    pub fn matches(&self) -> MatchSubscription {
        MatchSubscription {
            pushes: self.connection.subscribe(),
        }
    }

    pub fn config(&self) -> &MatchmakerConfig {
        &self.config
    }
}

fn from_connection(e: ConnectionError) -> MatchmakingError {
    match e {
        ConnectionError::NotConnected => MatchmakingError::NotConnected,
        other => MatchmakingError::Connection(other),
    }
}

fn unexpected(request: &str, reply: &ServerMessage) -> MatchmakingError {
    MatchmakingError::Protocol(ProtocolError::InvalidMessage(format!(
        "unexpected reply to {request}: {reply:?}"
    )))
}
