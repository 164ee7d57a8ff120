//! In-process transport: a [`Connector`] whose connections are channel pairs.
//!
//! The connector side is handed to the code under test; the
//! [`MemoryListener`] side plays the remote service. Each successful
//! `connect` shows up on the listener as a [`MemoryPeer`] that can read
//! what the client sent, answer, or drop the line to simulate a network
//! failure.
//!
//! Connect attempts can be scripted to fail with [`MemoryConnector::fail_next`]
//! or [`MemoryConnector::refuse_all`], or to hang with
//! [`MemoryConnector::stall_next`]. Every attempt (successful or not) is
//! recorded with its token and the Tokio clock reading, so tests running
//! on paused time can assert exact backoff spacing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::{Connection, ConnectionId, Connector, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_MEMORY_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A recorded connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// The token the client presented.
    pub token: String,
    /// When the attempt was made (Tokio clock).
    pub at: Instant,
    /// Whether the attempt produced a connection.
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct Script {
    stalls_remaining: u32,
    failures_remaining: u32,
    refuse_all: bool,
    attempts: Vec<ConnectAttempt>,
}

/// Client half of the in-memory transport.
///
/// Cheap to clone; clones share the same script and attempt log.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    script: Arc<StdMutex<Script>>,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server half of the in-memory transport. Yields one [`MemoryPeer`] per
/// accepted connection.
#[derive(Debug)]
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Creates a connected connector/listener pair.
    pub fn pair() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::new(StdMutex::new(Script::default())),
            accepted: tx,
        };
        (connector, MemoryListener { accepted: rx })
    }

    /// Makes the next `n` connect attempts fail.
    pub fn fail_next(&self, n: u32) {
        self.with_script(|s| s.failures_remaining = n);
    }

    /// Makes the next `n` connect attempts hang forever, like a server that
    /// accepts the TCP connection but never finishes the handshake.
    pub fn stall_next(&self, n: u32) {
        self.with_script(|s| s.stalls_remaining = n);
    }

    /// Makes every connect attempt fail until called again with `false`.
    pub fn refuse_all(&self, refuse: bool) {
        self.with_script(|s| s.refuse_all = refuse);
    }

    /// Returns every connect attempt made so far, in order.
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.with_script(|s| s.attempts.clone())
    }

    /// Returns the number of connect attempts made so far.
    pub fn attempt_count(&self) -> usize {
        self.with_script(|s| s.attempts.len())
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        // A poisoned lock only means another test thread panicked while
        // holding it; the script itself is still usable.
        let mut guard = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(
        &self,
        token: &str,
    ) -> Result<Self::Connection, TransportError> {
        let stall = self.with_script(|s| {
            if s.stalls_remaining == 0 {
                return false;
            }
            s.stalls_remaining -= 1;
            s.attempts.push(ConnectAttempt {
                token: token.to_string(),
                at: Instant::now(),
                accepted: false,
            });
            true
        });
        if stall {
            std::future::pending::<()>().await;
        }

        let accepted = self.with_script(|s| {
            let refuse = s.refuse_all || s.failures_remaining > 0;
            if s.failures_remaining > 0 {
                s.failures_remaining -= 1;
            }
            s.attempts.push(ConnectAttempt {
                token: token.to_string(),
                at: Instant::now(),
                accepted: !refuse,
            });
            !refuse
        });

        if !accepted {
            return Err(TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory connector refused the attempt",
            )));
        }

        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new(
            NEXT_MEMORY_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );

        let peer = MemoryPeer {
            id,
            token: token.to_string(),
            outbound: Some(to_client_tx),
            inbound: to_server_rx,
        };
        self.accepted.send(peer).map_err(|_| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory listener dropped",
            ))
        })?;

        tracing::debug!(%id, "memory connection opened");
        Ok(MemoryConnection {
            id,
            outbound: StdMutex::new(Some(to_server_tx)),
            inbound: Mutex::new(to_client_rx),
        })
    }
}

impl MemoryListener {
    /// Waits for the next accepted connection.
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }
}

/// The remote end of one in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    id: ConnectionId,
    token: String,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryPeer {
    /// The id of the client-side connection this peer talks to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The token presented when the connection was opened.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Delivers a frame to the client. Returns `false` if the client side
    /// is gone or the peer already hung up.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(data.into()).is_ok(),
            None => false,
        }
    }

    /// Receives the next frame the client sent. `None` once the client
    /// closed or dropped its connection.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Hangs up: the client's next `recv` returns `Ok(None)`.
    pub fn hang_up(&mut self) {
        self.outbound = None;
    }
}

/// Client half of one in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    outbound: StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryConnection {
    fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        match self.outbound.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let tx = self.sender().ok_or_else(|| {
            TransportError::ConnectionClosed("connection already closed".into())
        })?;
        tx.send(data.to_vec()).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "memory peer dropped",
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        // `UnboundedReceiver::recv` is cancel-safe.
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self.outbound.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
