//! Device identity and session management for lobbylink.
//!
//! This crate handles everything that happens before a realtime connection
//! exists:
//!
//! 1. **Identity**: a stable device id persisted through a
//!    [`KeyValueStore`] ([`IdentityStore`], [`MemoryStore`], [`FileStore`])
//! 2. **Authentication**: exchanging that id for a token
//!    ([`Authenticator`] trait, [`HttpAuthenticator`])
//! 3. **Session tracking**: holding the one current [`Session`]
//!    ([`AuthSession`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection Layer (above)  ← opens the socket with the session token
//!     ↕
//! Session Layer (this crate)  ← identity, login, logout
//!     ↕
//! Protocol Layer (below)  ← AuthRequest / AuthReply / RpcReply
//! ```

mod auth;
mod error;
mod identity;
mod manager;
mod session;
mod store;

pub use auth::{AUTH_RPC_ID, Authenticator, DEFAULT_AUTH_TIMEOUT, HttpAuthenticator};
pub use error::{SessionError, StorageError};
pub use identity::{DEVICE_ID_KEY, DISPLAY_NAME_PREFIX, DeviceIdentity, IdentityStore};
pub use manager::AuthSession;
pub use session::{RestoredSession, Session, restore_session};
pub use store::{FileStore, KeyValueStore, MemoryStore};
