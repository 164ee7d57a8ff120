//! Supervisor actor: the one task that owns the transport.
//!
//! The supervisor runs a loop of three phases:
//!
//! ```text
//! ┌─→ connecting ──ok──→ serving ──transport dropped or silent──┐
//! │       │                                                     │
//! │  failed or timed out                                        │
//! │       ↓                                                     │
//! └── backoff (one Sleep) ←─────────────────────────────────────┘
//! ```
//!
//! A connect attempt gets `connect_timeout` to finish. While serving, the
//! supervisor pings every `ping_interval`, and a connection that delivers
//! no frame at all for `idle_timeout` is given up like one the peer
//! closed.
//!
//! Every phase also listens for the shutdown signal (checked first, via
//! `biased;`) and for requests from [`ConnectionHandle`]s. Requests that
//! arrive while not serving are answered with `NotConnected` right away.
//!
//! [`ConnectionHandle`]: crate::ConnectionHandle

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lobbylink_protocol::{ClientRequest, Codec, Envelope, JsonCodec, ServerMessage};
use lobbylink_transport::{Connection, Connector, TransportError};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, OwnedMutexGuard};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{CloseEvent, ConnectionConfig, ConnectionError, ConnectionState, ConnectionStatus};

/// A reply to one request, tagged with the generation it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub generation: u64,
    pub message: ServerMessage,
}

pub(crate) type ReplySender = oneshot::Sender<Result<Reply, ConnectionError>>;

/// Commands sent to the supervisor through its channel.
pub(crate) enum Command {
    /// Send a request and deliver the correlated reply.
    Request {
        request: ClientRequest,
        reply: ReplySender,
    },
}

/// What a phase ended with: keep going, or stop for good.
enum Flow<T> {
    Continue(T),
    Shutdown,
}

/// Everything the supervisor task owns.
pub(crate) struct Supervisor<C: Connector> {
    pub(crate) connector: Arc<C>,
    pub(crate) token: String,
    pub(crate) config: ConnectionConfig,
    pub(crate) status: Arc<watch::Sender<ConnectionStatus>>,
    pub(crate) closes: broadcast::Sender<CloseEvent>,
    pub(crate) notifications: broadcast::Sender<ServerMessage>,
    pub(crate) commands: OwnedMutexGuard<mpsc::Receiver<Command>>,
    pub(crate) shutdown: oneshot::Receiver<()>,
    /// Fired (once) on the first successful connect.
    pub(crate) first_connect: Option<oneshot::Sender<()>>,
}

impl<C: Connector> Supervisor<C> {
    /// Takes ownership of the shared command receiver for the lifetime of
    /// the task. Waits if a previous supervisor still holds it.
    pub(crate) async fn acquire_commands(
        commands: &Arc<Mutex<mpsc::Receiver<Command>>>,
    ) -> OwnedMutexGuard<mpsc::Receiver<Command>> {
        Arc::clone(commands).lock_owned().await
    }

    /// Runs until shutdown. Never returns early on transport errors.
    pub(crate) async fn run(mut self) {
        info!("connection supervisor started");
        let mut attempt: u32 = 0;

        loop {
            self.publish(ConnectionState::Connecting, attempt);

            let connection = match self.connect_once().await {
                Flow::Shutdown => break,
                Flow::Continue(Ok(connection)) => connection,
                Flow::Continue(Err(e)) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.config.backoff.delay_for(attempt);
                    self.publish(ConnectionState::Reconnecting, attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connect attempt failed"
                    );
                    match self.backoff(delay).await {
                        Flow::Continue(()) => continue,
                        Flow::Shutdown => break,
                    }
                }
            };

            let generation = self.status.borrow().generation + 1;
            self.status.send_replace(ConnectionStatus {
                state: ConnectionState::Connected,
                attempt_count: 0,
                generation,
            });
            info!(connection_id = %connection.id(), generation, "connected");
            if let Some(signal) = self.first_connect.take() {
                let _ = signal.send(());
            }

            match self.serve(&connection, generation).await {
                Flow::Shutdown => {
                    if let Err(e) = connection.close().await {
                        debug!(error = %e, "close during shutdown failed");
                    }
                    break;
                }
                Flow::Continue(reason) => {
                    drop(connection);
                    attempt = 1;
                    let delay = self.config.backoff.delay_for(attempt);

                    // Leave Connected before anyone hears about the close.
                    self.publish(ConnectionState::Reconnecting, attempt);
                    let _ = self.closes.send(CloseEvent {
                        generation,
                        reason: reason.clone(),
                    });
                    warn!(
                        generation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "connection dropped"
                    );
                    if let Flow::Shutdown = self.backoff(delay).await {
                        break;
                    }
                }
            }
        }

        self.finish();
    }

    // -- phases -------------------------------------------------------------

    /// One connect attempt bounded by `connect_timeout`, interruptible by
    /// shutdown.
    async fn connect_once(&mut self) -> Flow<Result<C::Connection, TransportError>> {
        let connector = Arc::clone(&self.connector);
        let token = self.token.clone();
        let limit = self.config.connect_timeout;
        let connect = tokio::time::timeout(limit, connector.connect(&token));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => return Flow::Shutdown,
                Some(command) = self.commands.recv() => reject(command),
                result = &mut connect => {
                    let result = result.unwrap_or_else(|_| Err(TransportError::Timeout(limit)));
                    return Flow::Continue(result);
                }
            }
        }
    }

    /// Waits out one backoff delay. The single retry timer lives here.
    async fn backoff(&mut self, delay: Duration) -> Flow<()> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => return Flow::Shutdown,
                Some(command) = self.commands.recv() => reject(command),
                () = &mut sleep => return Flow::Continue(()),
            }
        }
    }

    /// Pumps requests out and frames in until the transport goes away or
    /// falls silent. Returns the close reason.
    async fn serve(&mut self, connection: &C::Connection, generation: u64) -> Flow<String> {
        let codec = JsonCodec;
        let mut pending: HashMap<String, ReplySender> = HashMap::new();
        let mut next_cid: u64 = 1;

        let idle_timeout = self.config.idle_timeout;
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);
        let ping_interval = self.config.ping_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => {
                    fail_pending(&mut pending, "connection shut down");
                    return Flow::Shutdown;
                }
                Some(command) = self.commands.recv() => {
                    let Command::Request { request, reply } = command;
                    let cid = next_cid.to_string();
                    next_cid += 1;
                    debug!(%cid, kind = request.kind(), generation, "sending request");

                    let frame = match codec.encode(&Envelope::request(cid.clone(), request)) {
                        Ok(frame) => frame,
                        Err(e) => {
                            let _ = reply.send(Err(e.into()));
                            continue;
                        }
                    };
                    if let Err(e) = connection.send(&frame).await {
                        let reason = e.to_string();
                        let _ = reply.send(Err(ConnectionError::Closed(reason.clone())));
                        fail_pending(&mut pending, &reason);
                        return Flow::Continue(reason);
                    }
                    // Callers that timed out dropped their receiver.
                    pending.retain(|_, waiting| !waiting.is_closed());
                    pending.insert(cid, reply);
                }
                frame = connection.recv() => match frame {
                    Ok(Some(bytes)) => {
                        idle.as_mut().reset(Instant::now() + idle_timeout);
                        self.dispatch(&codec, &bytes, &mut pending, generation);
                    }
                    Ok(None) => {
                        let reason = "connection closed by peer".to_string();
                        fail_pending(&mut pending, &reason);
                        return Flow::Continue(reason);
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        fail_pending(&mut pending, &reason);
                        return Flow::Continue(reason);
                    }
                },
                _ = keepalive.tick() => {
                    let cid = next_cid.to_string();
                    next_cid += 1;
                    let frame = match codec.encode(&Envelope::request(cid, ClientRequest::Ping)) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "could not encode ping");
                            continue;
                        }
                    };
                    if let Err(e) = connection.send(&frame).await {
                        let reason = e.to_string();
                        fail_pending(&mut pending, &reason);
                        return Flow::Continue(reason);
                    }
                }
                () = &mut idle => {
                    let reason = format!("no traffic for {idle_timeout:?}");
                    fail_pending(&mut pending, &reason);
                    return Flow::Continue(reason);
                }
            }
        }
    }

    // -- helpers ------------------------------------------------------------

    /// Routes one inbound frame: replies to their waiter, pushes to
    /// subscribers.
    fn dispatch(
        &self,
        codec: &JsonCodec,
        bytes: &[u8],
        pending: &mut HashMap<String, ReplySender>,
        generation: u64,
    ) {
        let envelope: Envelope = match codec.decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        let cid = envelope.cid.clone();
        match envelope.into_server_message() {
            Ok((Some(cid), message)) => match pending.remove(&cid) {
                Some(reply) => {
                    let _ = reply.send(Ok(Reply { generation, message }));
                }
                // Keepalive answer.
                None if message == ServerMessage::Pong => {}
                None => debug!(%cid, "reply for unknown or abandoned request"),
            },
            Ok((None, message)) => {
                // No subscribers is fine.
                let _ = self.notifications.send(message);
            }
            Err(e) => match cid.and_then(|cid| pending.remove(&cid)) {
                Some(reply) => {
                    let _ = reply.send(Err(e.into()));
                }
                None => warn!(error = %e, "dropping malformed server message"),
            },
        }
    }

    fn publish(&self, state: ConnectionState, attempt_count: u32) {
        self.status.send_modify(|status| {
            status.state = state;
            status.attempt_count = attempt_count;
        });
    }

    /// Final state after shutdown: Disconnected, counter reset, and nobody
    /// left waiting on a queued request.
    fn finish(mut self) {
        self.publish(ConnectionState::Disconnected, 0);
        while let Ok(command) = self.commands.try_recv() {
            reject(command);
        }
        info!("connection supervisor stopped");
    }
}

fn reject(command: Command) {
    match command {
        Command::Request { reply, .. } => {
            let _ = reply.send(Err(ConnectionError::NotConnected));
        }
    }
}

fn fail_pending(pending: &mut HashMap<String, ReplySender>, reason: &str) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(ConnectionError::Closed(reason.to_string())));
    }
}
