//! Supervised realtime connection for lobbylink.
//!
//! This crate keeps one persistent connection to the realtime service up
//! for as long as the application wants it:
//!
//! - **[`ConnectionManager`]**: `connect` / `disconnect`, owns the
//!   supervisor task
//! - **[`ConnectionHandle`]**: what everyone else uses to send requests and
//!   watch status
//! - **[`BackoffPolicy`]**: `min(base * 2^attempt, max)` between retries
//! - **[`ConnectionStatus`]**: state, retry counter and generation,
//!   published through a `watch` channel
//!
//! # Actor model
//!
//! All transport I/O happens inside a single Tokio task. The outside world
//! talks to it through channels only, so there is no lock around the
//! socket and no way for a consumer to close or replace it:
//!
//! ```text
//! ConnectionHandle ──mpsc Command──→ Supervisor ──bytes──→ Transport
//!        ↑                               │
//!        └──oneshot Reply / watch status─┘
//! ```

mod config;
mod error;
mod handle;
mod manager;
mod state;
mod supervisor;

pub use config::{BackoffPolicy, ConnectionConfig};
pub use error::ConnectionError;
pub use handle::ConnectionHandle;
pub use manager::ConnectionManager;
pub use state::{CloseEvent, ConnectionState, ConnectionStatus};
pub use supervisor::Reply;
