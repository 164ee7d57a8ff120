//! # lobbylink
//!
//! Client-side session and realtime connection lifecycle for multiplayer
//! game lobbies.
//!
//! A game client needs four things before it can find a match:
//!
//! 1. a stable **device identity** ([`lobbylink_session::IdentityStore`])
//! 2. an authenticated **session** ([`lobbylink_session::AuthSession`])
//! 3. a **realtime connection** that survives network hiccups
//!    ([`lobbylink_connection::ConnectionManager`])
//! 4. a **matchmaking** client that hands out queue tickets
//!    ([`lobbylink_matchmaking::MatchmakingClient`])
//!
//! [`LobbyClient`] wires them together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbylink::prelude::*;
//!
//! # async fn run() -> Result<(), LobbylinkError> {
//! lobbylink::init_tracing();
//!
//! let config = ClientConfig::from_env()?;
//! let mut client = LobbyClient::from_config(config, ".lobbylink");
//! client.login().await?;
//!
//! if let Some(matchmaking) = client.matchmaking() {
//!     let mut matches = matchmaking.matches();
//!     let ticket = matchmaking.enqueue(QueueMode::Casual).await?;
//!     if let Some(found) = matches.recv().await {
//!         println!("matched on {}: {:?}", ticket.id(), found.match_id);
//!     }
//! }
//!
//! client.dispose().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::LobbyClient;
pub use config::{
    ClientConfig, ENV_AUTH_TIMEOUT_SECS, ENV_HOST, ENV_PORT, ENV_SERVER_KEY, ENV_SSL,
};
pub use error::{ConfigError, LobbylinkError};

pub use lobbylink_connection as connection;
pub use lobbylink_matchmaking as matchmaking;
pub use lobbylink_protocol as protocol;
pub use lobbylink_session as session;
pub use lobbylink_transport as transport;

/// Installs a `tracing` subscriber for binaries.
///
/// Honors `RUST_LOG`; defaults to `info`. Calling it twice is harmless:
/// the second call leaves the first subscriber in place.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// The types most applications need.
pub mod prelude {
    pub use crate::{ClientConfig, ConfigError, LobbyClient, LobbylinkError};
    pub use lobbylink_connection::{
        BackoffPolicy, CloseEvent, ConnectionConfig, ConnectionState, ConnectionStatus,
    };
    pub use lobbylink_matchmaking::{
        MatchFound, MatchSubscription, MatchmakerConfig, MatchmakingClient, QueueTicket,
    };
    pub use lobbylink_protocol::QueueMode;
    pub use lobbylink_session::Session;
}
