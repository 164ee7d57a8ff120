//! `LobbyClient`: the explicit context object tying every layer together.

use std::path::PathBuf;

use lobbylink_connection::{ConnectionManager, ConnectionStatus};
use lobbylink_matchmaking::{MatchmakerConfig, MatchmakingClient};
use lobbylink_session::{
    AuthSession, Authenticator, FileStore, HttpAuthenticator, KeyValueStore, Session,
};
use lobbylink_transport::{Connector, WebSocketConnector};

use crate::{ClientConfig, LobbylinkError};

/// Owns one player's session, connection and matchmaking client.
///
/// Lifecycle: create → [`login`](Self::login) → use
/// [`matchmaking`](Self::matchmaking) → [`dispose`](Self::dispose). There is
/// no global instance; whoever creates the client passes it around.
///
/// ```text
///        login()                       connect ok
/// (new) ────────→ AuthSession::login ───────────→ MatchmakingClient ready
///                        │
///                  ConnectionManager (reconnects on its own)
/// ```
pub struct LobbyClient<A: Authenticator, S: KeyValueStore, C: Connector> {
    auth: AuthSession<A, S>,
    connection: ConnectionManager<C>,
    matchmaker_config: MatchmakerConfig,
    matchmaking: Option<MatchmakingClient>,
}

impl LobbyClient<HttpAuthenticator, FileStore, WebSocketConnector> {
    /// A client for the real service described by `config`, persisting its
    /// device identity under `data_dir`.
    pub fn from_config(config: ClientConfig, data_dir: impl Into<PathBuf>) -> Self {
        let auth = HttpAuthenticator::new(config.http_base_url(), config.server_key.clone())
            .with_timeout(config.auth_timeout);
        let connector = WebSocketConnector::new(config.socket_url());
        Self::new(&config, auth, FileStore::new(data_dir), connector)
    }
}

impl<A: Authenticator, S: KeyValueStore, C: Connector> LobbyClient<A, S, C> {
    /// Assembles a client from its parts. Nothing happens until `login`.
    pub fn new(config: &ClientConfig, authenticator: A, store: S, connector: C) -> Self {
        Self {
            auth: AuthSession::new(authenticator, store),
            connection: ConnectionManager::new(connector, config.connection.clone()),
            matchmaker_config: config.matchmaker,
            matchmaking: None,
        }
    }

    /// Authenticates, then opens the realtime connection.
    ///
    /// Resolves once the connection is up. If authentication fails there is
    /// no session and nothing is connected.
    ///
    /// # Errors
    /// - [`LobbylinkError::Session`] if login failed
    /// - [`LobbylinkError::Connection`] if the connection was shut down
    ///   before it came up
    pub async fn login(&mut self) -> Result<Session, LobbylinkError> {
        self.teardown_connection().await;
        let session = self.auth.login().await?;
        self.connect().await?;
        Ok(session)
    }

    /// (Re)opens the realtime connection for the current session.
    ///
    /// # Errors
    /// Returns [`LobbylinkError::NotLoggedIn`] without a session.
    pub async fn connect(&mut self) -> Result<(), LobbylinkError> {
        let session = self.auth.current().ok_or(LobbylinkError::NotLoggedIn)?;
        let handle = self.connection.connect(session).await?;
        self.matchmaking = Some(MatchmakingClient::new(handle, self.matchmaker_config));
        Ok(())
    }

    /// Closes the connection and forgets the session.
    pub async fn logout(&mut self) {
        self.teardown_connection().await;
        self.auth.logout();
    }

    /// Logs out and releases everything the client owns.
    pub async fn dispose(mut self) {
        self.logout().await;
        tracing::debug!("lobby client disposed");
    }

    async fn teardown_connection(&mut self) {
        self.matchmaking = None;
        self.connection.disconnect().await;
    }

    /// The current session, if logged in.
    pub fn session(&self) -> Option<&Session> {
        self.auth.current()
    }

    /// The matchmaking client, available once connected.
    pub fn matchmaking(&self) -> Option<&MatchmakingClient> {
        self.matchmaking.as_ref()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// The connection manager, for status watching and close events.
    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }
}
