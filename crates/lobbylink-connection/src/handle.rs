//! `ConnectionHandle`: the consumer-facing side of a managed connection.

use std::time::Duration;

use lobbylink_protocol::{ClientRequest, ServerMessage};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::supervisor::{Command, Reply};
use crate::{ConnectionError, ConnectionStatus};

/// A cheap, cloneable way to talk through the managed connection.
///
/// A handle never owns the transport. It can only queue requests for the
/// supervisor and observe status; it cannot close or replace the socket.
/// Handles stay valid across reconnects and across `connect()` calls on
/// the same manager.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) status: watch::Receiver<ConnectionStatus>,
    pub(crate) notifications: broadcast::Sender<ServerMessage>,
    pub(crate) request_timeout: Duration,
}

impl ConnectionHandle {
    /// The current status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A receiver that wakes on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Returns `true` if the connection is up and still on `generation`.
    pub fn is_live(&self, generation: u64) -> bool {
        self.status().is_live(generation)
    }

    /// Sends one request and waits for its correlated reply.
    ///
    /// No retries: if the transport drops mid-request the caller gets
    /// [`ConnectionError::Closed`] and decides what to do.
    ///
    /// # Errors
    /// - [`ConnectionError::NotConnected`] immediately if not `Connected`
    /// - [`ConnectionError::Closed`] if the transport went away first
    /// - [`ConnectionError::Timeout`] if no reply arrived in time
    /// - [`ConnectionError::Shutdown`] if the manager is gone
    pub async fn request(&self, request: ClientRequest) -> Result<Reply, ConnectionError> {
        if !self.status().state.is_connected() {
            return Err(ConnectionError::NotConnected);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Request {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConnectionError::Shutdown)?;

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectionError::Shutdown),
            Err(_) => Err(ConnectionError::Timeout(self.request_timeout)),
        }
    }

    /// Subscribes to server pushes (messages without a correlation id).
    ///
    /// Only pushes that arrive after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.notifications.subscribe()
    }
}
