//! `ConnectionManager`: starts, replaces and stops the supervisor task.

use std::sync::Arc;

use lobbylink_protocol::ServerMessage;
use lobbylink_session::{Session, restore_session};
use lobbylink_transport::Connector;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::supervisor::{Command, Supervisor};
use crate::{
    CloseEvent, ConnectionConfig, ConnectionError, ConnectionHandle, ConnectionState,
    ConnectionStatus,
};

/// The running supervisor, if any.
struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Running {
    /// Signals shutdown and waits for the task to finish, so nothing it
    /// owned (transport, retry timer) outlives this call.
    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "connection supervisor ended abnormally");
        }
    }
}

/// Owns the realtime connection's lifecycle.
///
/// The manager itself never touches the socket. Each [`connect`] spawns a
/// supervisor task that owns the transport exclusively, retries with
/// backoff, and serves requests from [`ConnectionHandle`]s:
///
/// ```text
/// ConnectionManager ──spawn──→ Supervisor task ──owns──→ Transport
///        │                          ↑
///        └─handle()─→ ConnectionHandle (requests, status)
/// ```
///
/// At most one supervisor runs per manager: `connect` stops the previous
/// one before starting the next.
///
/// [`connect`]: ConnectionManager::connect
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    config: ConnectionConfig,
    status: Arc<watch::Sender<ConnectionStatus>>,
    closes: broadcast::Sender<CloseEvent>,
    notifications: broadcast::Sender<ServerMessage>,
    commands_tx: mpsc::Sender<Command>,
    /// Held by the running supervisor; survives it being replaced.
    commands_rx: Arc<Mutex<mpsc::Receiver<Command>>>,
    running: Mutex<Option<Running>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager in the `Disconnected` state. Nothing is spawned
    /// until [`connect`](Self::connect).
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        let config = config.validated();
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (closes, _) = broadcast::channel(config.event_buffer);
        let (notifications, _) = broadcast::channel(config.event_buffer);
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer);

        Self {
            connector: Arc::new(connector),
            config,
            status: Arc::new(status),
            closes,
            notifications,
            commands_tx,
            commands_rx: Arc::new(Mutex::new(commands_rx)),
            running: Mutex::new(None),
        }
    }

    /// Opens the realtime connection for `session` and resolves once the
    /// first attempt succeeds.
    ///
    /// Failed attempts are retried with backoff without resolving. A
    /// supervisor left over from an earlier `connect` is stopped first.
    ///
    /// # Errors
    /// Returns [`ConnectionError::Shutdown`] if [`disconnect`](Self::disconnect)
    /// runs (or the manager is dropped) before the first success.
    pub async fn connect(&self, session: &Session) -> Result<ConnectionHandle, ConnectionError> {
        let restored = restore_session(session.token());
        let (first_tx, first_rx) = oneshot::channel();

        {
            let mut running = self.running.lock().await;
            if let Some(previous) = running.take() {
                tracing::info!("replacing running connection");
                previous.stop().await;
            }

            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let supervisor = Supervisor {
                connector: Arc::clone(&self.connector),
                token: restored.token().to_string(),
                config: self.config.clone(),
                status: Arc::clone(&self.status),
                closes: self.closes.clone(),
                notifications: self.notifications.clone(),
                commands: Supervisor::<C>::acquire_commands(&self.commands_rx).await,
                shutdown: shutdown_rx,
                first_connect: Some(first_tx),
            };
            let task = tokio::spawn(supervisor.run());
            *running = Some(Running {
                shutdown: shutdown_tx,
                task,
            });
        }

        tracing::info!(username = %session.username(), "connecting");
        first_rx.await.map_err(|_| ConnectionError::Shutdown)?;
        Ok(self.handle())
    }

    /// Tears the connection down: closes the transport, cancels any retry
    /// timer and sets `Disconnected` with `attempt_count = 0`.
    ///
    /// When this returns no further connect attempt will be made.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let previous = self.running.lock().await.take();
        match previous {
            Some(running) => {
                running.stop().await;
                tracing::info!("disconnected");
            }
            None => {
                self.status.send_modify(|status| {
                    status.state = ConnectionState::Disconnected;
                    status.attempt_count = 0;
                });
            }
        }
    }

    /// A new handle onto this manager's connection.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            commands: self.commands_tx.clone(),
            status: self.status.subscribe(),
            notifications: self.notifications.clone(),
            request_timeout: self.config.request_timeout,
        }
    }

    /// The current status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A receiver that wakes on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// One [`CloseEvent`] per unexpected transport drop, from now on.
    pub fn on_close(&self) -> broadcast::Receiver<CloseEvent> {
        self.closes.subscribe()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.task.abort();
        }
        self.status.send_modify(|status| {
            status.state = ConnectionState::Disconnected;
            status.attempt_count = 0;
        });
    }
}
